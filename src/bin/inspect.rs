//! AtlasTS Inspect Binary
//!
//! Offline inspection and maintenance of an AtlasTS data directory.
//!
//! ## Usage
//! ```text
//! atlasts-inspect stats ./data
//! atlasts-inspect dump ./data/tsm/000000003-01-000.tsm
//! atlasts-inspect verify-wal ./data
//! atlasts-inspect compact ./data --full
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use atlasts::storage::{FileId, TsmReader};
use atlasts::wal::WalRecovery;
use atlasts::{Config, Engine, Predicate, SeriesKey, TimeRange};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasTS Inspect
#[derive(Parser, Debug)]
#[command(name = "atlasts-inspect")]
#[command(about = "Inspect and maintain an AtlasTS data directory")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the engine and print its statistics
    Stats {
        /// Data directory
        dir: PathBuf,
    },

    /// List TSM files with their levels and sizes
    Files {
        /// Data directory
        dir: PathBuf,
    },

    /// List known series
    Series {
        /// Data directory
        dir: PathBuf,

        /// Only series of this measurement
        #[arg(short, long)]
        measurement: Option<String>,
    },

    /// Print the points of one series
    Query {
        /// Data directory
        dir: PathBuf,

        /// Canonical series key, e.g. "cpu,host=a#usage"
        series: String,

        /// Inclusive start (nanoseconds)
        #[arg(long, default_value_t = i64::MIN)]
        start: i64,

        /// Inclusive end (nanoseconds)
        #[arg(long, default_value_t = i64::MAX)]
        end: i64,
    },

    /// Print the index of one TSM file and verify its blocks
    Dump {
        /// Path to a .tsm file
        file: PathBuf,
    },

    /// Check WAL segments without modifying them
    VerifyWal {
        /// Data directory
        dir: PathBuf,
    },

    /// Check every block checksum of every TSM file
    VerifyTsm {
        /// Data directory
        dir: PathBuf,
    },

    /// Run compaction now, then close
    Compact {
        /// Data directory
        dir: PathBuf,

        /// Merge everything into a single level
        #[arg(long)]
        full: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasts=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("AtlasTS Inspect v{}", atlasts::VERSION);

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> atlasts::Result<()> {
    match command {
        Commands::Dump { file } => dump(&file),
        Commands::VerifyWal { dir } => {
            let result = WalRecovery::verify(&offline_config(&dir).wal_dir())?;
            println!("segments:          {}", result.segments.len());
            println!("entries recovered: {}", result.entries_recovered);
            println!("entries corrupted: {}", result.entries_corrupted);
            println!("last lsn:          {}", result.last_lsn);
            println!("needs repair:      {}", result.entries_corrupted > 0);
            Ok(())
        }
        Commands::VerifyTsm { dir } => verify_tsm(&offline_config(&dir).tsm_dir()),
        Commands::Stats { dir } => with_engine(&dir, print_stats),
        Commands::Files { dir } => with_engine(&dir, print_files),
        Commands::Series { dir, measurement } => with_engine(&dir, |engine| {
            let predicate = match measurement {
                Some(m) => Predicate::Measurement(m),
                None => Predicate::All,
            };
            for key in engine.series(&predicate) {
                println!("{}", key);
            }
            Ok(())
        }),
        Commands::Query {
            dir,
            series,
            start,
            end,
        } => with_engine(&dir, |engine| {
            let key = SeriesKey::parse(&series)?;
            let cursor = engine.query_series(&key, TimeRange::new(start, end))?;
            for point in cursor.collect_points()? {
                println!("{} {:?}", point.timestamp, point.value);
            }
            Ok(())
        }),
        Commands::Compact { dir, full } => with_engine(&dir, |engine| {
            let jobs = if full {
                engine.compact_full()?
            } else {
                engine.flush()?;
                engine.compact()?
            };
            println!("compaction jobs run: {}", jobs);
            Ok(())
        }),
    }
}

/// Config for tooling: compaction only runs when asked for
fn offline_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .background_compaction(false)
        .build()
}

fn with_engine<F>(dir: &Path, f: F) -> atlasts::Result<()>
where
    F: FnOnce(&Engine) -> atlasts::Result<()>,
{
    let engine = Engine::open(offline_config(dir))?;
    f(&engine)?;
    engine.close()
}

fn print_stats(engine: &Engine) -> atlasts::Result<()> {
    let stats = engine.stats();
    println!("series:           {}", stats.series);
    println!("cache bytes:      {}", stats.cache_bytes);
    println!("cache points:     {}", stats.cache_points);
    println!("wal segments:     {}", stats.wal_segments);
    println!("wal bytes:        {}", stats.wal_bytes);
    println!("last lsn:         {}", stats.last_lsn);
    for (level, count) in &stats.files_per_level {
        println!("level {} files:    {}", level, count);
    }
    println!("tsm bytes:        {}", stats.total_file_bytes);
    println!("tombstoned files: {}", stats.tombstoned_files);
    println!("{:#?}", stats.compactions);
    Ok(())
}

fn print_files(engine: &Engine) -> atlasts::Result<()> {
    for file in engine.file_store().current().iter() {
        let reader = file.reader();
        println!(
            "{}  level={} size={} keys={} blocks={} max_seq={} tombstones={}",
            file.id(),
            file.level(),
            file.size(),
            reader.key_count(),
            reader.block_count(),
            reader.max_sequence(),
            file.tombstones().len()
        );
    }
    Ok(())
}

fn dump(path: &Path) -> atlasts::Result<()> {
    let reader = TsmReader::open(path)?;
    println!("file:         {}", reader.id());
    println!("size:         {}", reader.size());
    println!("max sequence: {}", reader.max_sequence());
    if let Some(range) = reader.time_range() {
        println!("time range:   [{}, {}]", range.min, range.max);
    }
    println!();

    for key_index in reader.index() {
        println!(
            "{}  type={} blocks={}",
            key_index.key,
            key_index.value_type,
            key_index.entries.len()
        );
        for entry in &key_index.entries {
            println!(
                "    [{}, {}]  offset={} size={}",
                entry.min_time, entry.max_time, entry.offset, entry.size
            );
        }
    }

    let failures = reader.verify();
    println!();
    for (key, entry, error) in &failures {
        println!("corrupt: {} block at offset {}: {}", key, entry.offset, error);
    }
    println!(
        "blocks verified: {}, corrupt: {}",
        reader.block_count(),
        failures.len()
    );
    Ok(())
}

fn verify_tsm(dir: &Path) -> atlasts::Result<()> {
    if !dir.exists() {
        println!("no TSM directory at {}", dir.display());
        return Ok(());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| FileId::parse(p).is_some())
        .collect();
    paths.sort();

    let mut bad = 0usize;
    for path in paths {
        match TsmReader::open(&path) {
            Ok(reader) => {
                let failures = reader.verify();
                if failures.is_empty() {
                    println!("{}  ok ({} blocks)", reader.id(), reader.block_count());
                }
                for (key, entry, error) in failures {
                    bad += 1;
                    println!(
                        "{}  {} block at offset {}: {}",
                        reader.id(),
                        key,
                        entry.offset,
                        error
                    );
                }
            }
            Err(e) => {
                bad += 1;
                println!("{}  unreadable: {}", path.display(), e);
            }
        }
    }
    println!("corrupt blocks or files: {}", bad);
    Ok(())
}
