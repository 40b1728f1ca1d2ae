//! Background compaction
//!
//! A scheduler thread plans work and hands it to a fixed pool of worker
//! threads over a `crossbeam` channel. Workers report back on an event
//! channel the scheduler also uses for wake-ups. At most one job per group
//! (flush, each level, full) runs at a time. Input exclusion comes from the
//! compactor's claims, which foreground compactions share.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::error::{CompactionErrorKind, Result};

use super::{CompactionJob, Compactor, JobKind, FLUSH_LEVEL, MAX_LEVEL};

/// Work handed to a worker
#[derive(Debug, Clone)]
enum Task {
    Flush,
    Merge(CompactionJob),
}

impl Task {
    fn group(&self) -> JobKind {
        match self {
            Task::Flush => JobKind::Flush,
            Task::Merge(job) => job.kind,
        }
    }
}

enum Event {
    Wake,
    Done {
        task: Task,
        outcome: std::result::Result<(), CompactionErrorKind>,
    },
}

/// Handle to the scheduler and worker threads
pub struct CompactionScheduler {
    events: Sender<Event>,
    wake_pending: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionScheduler {
    /// Start the scheduler and `compaction_workers` workers
    pub fn start(compactor: Arc<Compactor>) -> Result<Self> {
        let workers = compactor.config().compaction_workers.max(1);
        let (task_tx, task_rx) = channel::unbounded::<Task>();
        let (event_tx, event_rx) = channel::unbounded::<Event>();

        let mut worker_handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let compactor = Arc::clone(&compactor);
            let tasks = task_rx.clone();
            let events = event_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("atlasts-compact-{}", i))
                .spawn(move || worker_loop(&compactor, &tasks, &events))?;
            worker_handles.push(handle);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let wake_pending = Arc::new(AtomicBool::new(false));
        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let wake_pending = Arc::clone(&wake_pending);
            thread::Builder::new()
                .name("atlasts-scheduler".into())
                .spawn(move || {
                    let mut state = SchedulerState::new(compactor, task_tx);
                    state.run(&event_rx, &shutdown, &wake_pending);
                    // Closing the task channel lets the workers exit
                    drop(state);
                    for handle in worker_handles {
                        if handle.join().is_err() {
                            warn!("compaction worker panicked");
                        }
                    }
                })?
        };

        info!(workers, "compaction scheduler started");
        Ok(Self {
            events: event_tx,
            wake_pending,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Ask the scheduler to plan now instead of at its next tick
    pub fn wake(&self) {
        if !self.wake_pending.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(Event::Wake);
        }
    }

    /// Stop planning, abort running jobs and wait for every thread
    pub fn shutdown(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };
        self.shutdown.store(true, Ordering::Release);
        let _ = self.events.send(Event::Wake);
        if handle.join().is_err() {
            warn!("compaction scheduler panicked");
        }
        info!("compaction scheduler stopped");
    }
}

impl Drop for CompactionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(compactor: &Compactor, tasks: &Receiver<Task>, events: &Sender<Event>) {
    for task in tasks.iter() {
        let outcome = match &task {
            Task::Flush => compactor.flush().map(|_| ()),
            Task::Merge(job) => compactor.execute(job).map(|_| ()),
        }
        .map_err(|e| e.compaction_kind());
        if events.send(Event::Done { task, outcome }).is_err() {
            break;
        }
    }
}

struct SchedulerState {
    compactor: Arc<Compactor>,
    tasks: Option<Sender<Task>>,
    /// Groups with a task in flight
    running: HashSet<JobKind>,
    retry_after: HashMap<JobKind, Instant>,
}

impl SchedulerState {
    fn new(compactor: Arc<Compactor>, tasks: Sender<Task>) -> Self {
        Self {
            compactor,
            tasks: Some(tasks),
            running: HashSet::new(),
            retry_after: HashMap::new(),
        }
    }

    fn run(&mut self, events: &Receiver<Event>, shutdown: &AtomicBool, wake_pending: &AtomicBool) {
        let interval = self.compactor.config().compaction_check_interval;
        loop {
            match events.recv_timeout(interval) {
                Ok(Event::Wake) => wake_pending.store(false, Ordering::Release),
                Ok(Event::Done { task, outcome }) => self.finished(task, outcome),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            self.plan();
        }

        // Stop running jobs at their next block and collect their results
        self.tasks = None;
        self.compactor.abort_running();
        while !self.running.is_empty() {
            match events.recv_timeout(Duration::from_secs(1)) {
                Ok(Event::Done { task, outcome }) => self.finished(task, outcome),
                Ok(Event::Wake) => {}
                Err(RecvTimeoutError::Timeout) => debug!(running = self.running.len(), "waiting for compaction jobs"),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.compactor.clear_abort();
    }

    fn finished(&mut self, task: Task, outcome: std::result::Result<(), CompactionErrorKind>) {
        let group = task.group();
        self.running.remove(&group);
        match outcome {
            Ok(()) => {
                self.retry_after.remove(&group);
            }
            Err(CompactionErrorKind::Aborted) => {}
            Err(kind) => {
                let backoff = self.compactor.config().compaction_retry_backoff;
                debug!(group = ?group, ?kind, backoff_ms = backoff.as_millis() as u64, "retrying after backoff");
                self.retry_after.insert(group, Instant::now() + backoff);
            }
        }
    }

    fn plan(&mut self) {
        let compactor = Arc::clone(&self.compactor);
        let config = compactor.config();
        let cache = compactor.cache();

        if cache.live_bytes() >= config.cache_snapshot_size || cache.current_snapshot().is_some() {
            self.dispatch(Task::Flush);
        }

        let full_running = self.running.contains(&JobKind::Full);
        if !full_running {
            for level in FLUSH_LEVEL..MAX_LEVEL {
                let group = JobKind::Level(level);
                if self.running.contains(&group) || self.backing_off(group) {
                    continue;
                }
                if let Some(job) = self.compactor.plan_level(level) {
                    self.dispatch(Task::Merge(job));
                }
            }
        }

        let levels_running = self.running.iter().any(|k| matches!(k, JobKind::Level(_)));
        if !full_running && !levels_running && !self.backing_off(JobKind::Full) && self.compactor.is_cold() {
            if let Some(job) = self.compactor.plan_full() {
                self.dispatch(Task::Merge(job));
            }
        }
    }

    fn dispatch(&mut self, task: Task) {
        let group = task.group();
        let accepted = !self.running.contains(&group) && !self.backing_off(group);
        let sent = match &self.tasks {
            Some(tasks) if accepted => match tasks.send(task) {
                Ok(()) => None,
                Err(returned) => {
                    warn!("compaction workers are gone");
                    Some(returned.into_inner())
                }
            },
            _ => Some(task),
        };
        match sent {
            None => {
                self.running.insert(group);
            }
            Some(Task::Merge(job)) => self.compactor.release(&job),
            Some(Task::Flush) => {}
        }
    }

    fn backing_off(&self, group: JobKind) -> bool {
        self.retry_after
            .get(&group)
            .map_or(false, |until| Instant::now() < *until)
    }
}
