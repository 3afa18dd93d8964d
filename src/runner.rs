//! Background execution of blocking network operations.
//!
//! Facade methods look synchronous but never run network I/O on the calling
//! thread: each operation is boxed up as a [`Task`] and handed to a
//! [`TaskRunner`], which executes it on a worker and hands the outcome back.
//! The production runner is [`WorkerPool`]; [`InlineRunner`] runs tasks on the
//! calling thread for callers and tests that want deterministic scheduling.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::error::{FirekitError, Result};

/// A single blocking operation: one network round trip, one outcome.
pub type Task = Box<dyn FnOnce() -> Result<String> + Send + 'static>;

/// Executes tasks off the caller's thread.
///
/// `submit` blocks until the task's outcome is available; it never drops a
/// task silently.  Implementations are shared across facade instances, so
/// they must be usable from multiple threads at once.
pub trait TaskRunner: Send + Sync {
    /// Runs `task` and returns its outcome.  Any fault raised while running
    /// it (including a panic) comes back as a [`FirekitError::Task`].
    fn submit(&self, task: Task) -> Result<String>;

    /// Stops accepting new submissions.  Queued and in-flight tasks are
    /// allowed to finish; later submissions fail fast with
    /// [`FirekitError::ShutDown`].
    fn shutdown(&self);
}

struct Job {
    task: Task,
    reply: mpsc::Sender<Result<String>>,
}

struct PoolState {
    /// `None` once the pool is shut down.
    sender: Option<mpsc::Sender<Job>>,
    spawned: usize,
    handles: Vec<thread::JoinHandle<()>>,
}

/// A grow-on-demand pool of named worker threads over one shared job queue.
///
/// Workers are spawned lazily: a submission only starts a new thread when no
/// worker is idle and the pool is below its bound.  Idle workers are reused.
pub struct WorkerPool {
    label: &'static str,
    max_workers: usize,
    idle: Arc<AtomicUsize>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(label: &'static str, max_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            label,
            max_workers: max_workers.max(1),
            idle: Arc::new(AtomicUsize::new(0)),
            receiver: Arc::new(Mutex::new(receiver)),
            state: Mutex::new(PoolState {
                sender: Some(sender),
                spawned: 0,
                handles: Vec::new(),
            }),
        }
    }

    fn spawn_worker(&self, state: &mut PoolState) -> Result<()> {
        let receiver = Arc::clone(&self.receiver);
        let idle = Arc::clone(&self.idle);
        let name = format!("{}-{}", self.label, state.spawned);
        debug!(worker = %name, "starting pool worker");
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(receiver, idle))?;
        state.spawned += 1;
        state.handles.push(handle);
        Ok(())
    }
}

impl TaskRunner for WorkerPool {
    fn submit(&self, task: Task) -> Result<String> {
        let reply_rx = {
            let mut state = self.state.lock().unwrap();
            let sender = match state.sender.as_ref() {
                Some(sender) => sender.clone(),
                None => return Err(FirekitError::ShutDown),
            };
            if self.idle.load(Ordering::SeqCst) == 0 && state.spawned < self.max_workers {
                self.spawn_worker(&mut state)?;
            }
            let (reply_tx, reply_rx) = mpsc::channel();
            let job = Job {
                task,
                reply: reply_tx,
            };
            if sender.send(job).is_err() {
                return Err(FirekitError::ShutDown);
            }
            reply_rx
        };

        match reply_rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(FirekitError::Task(
                "worker exited before returning a result".to_string(),
            )),
        }
    }

    fn shutdown(&self) {
        let handles = {
            let mut state = self.state.lock().unwrap();
            // Closing the sender lets workers drain the queue and exit.
            state.sender = None;
            std::mem::take(&mut state.handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>, idle: Arc<AtomicUsize>) {
    loop {
        idle.fetch_add(1, Ordering::SeqCst);
        let job = receiver.lock().unwrap().recv();
        idle.fetch_sub(1, Ordering::SeqCst);

        let job = match job {
            Ok(job) => job,
            // Queue closed: the pool is shutting down.
            Err(_) => break,
        };

        let outcome = catch_unwind(AssertUnwindSafe(job.task)).unwrap_or_else(|_| {
            warn!("task panicked on a pool worker");
            Err(FirekitError::Task("task panicked".to_string()))
        });
        // The submitter may have given up waiting; nothing left to do then.
        let _ = job.reply.send(outcome);
    }
}

/// Runs each task on the calling thread.
///
/// Useful in tests and for callers that need deterministic ordering across
/// facades; the shutdown contract is honored the same way as the pool's.
#[derive(Default)]
pub struct InlineRunner {
    closed: AtomicBool,
}

impl InlineRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRunner for InlineRunner {
    fn submit(&self, task: Task) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FirekitError::ShutDown);
        }
        catch_unwind(AssertUnwindSafe(task))
            .unwrap_or_else(|_| Err(FirekitError::Task("task panicked".to_string())))
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

const SHARED_WORKERS: usize = 8;

/// Pool shared by every database and storage facade in the process.
static SHARED_POOL: Lazy<Arc<WorkerPool>> =
    Lazy::new(|| Arc::new(WorkerPool::new("firekit-io", SHARED_WORKERS)));

/// Single-worker queue for the identity facade, so session-mutating calls
/// against one credential are never reordered relative to each other.
static IDENTITY_POOL: Lazy<Arc<WorkerPool>> =
    Lazy::new(|| Arc::new(WorkerPool::new("firekit-identity", 1)));

pub(crate) fn shared_pool() -> Arc<dyn TaskRunner> {
    SHARED_POOL.clone() as Arc<dyn TaskRunner>
}

pub(crate) fn identity_pool() -> Arc<dyn TaskRunner> {
    IDENTITY_POOL.clone() as Arc<dyn TaskRunner>
}

/// Shuts down the process-wide pools.  In-flight operations finish; every
/// facade call made afterwards fails fast with [`FirekitError::ShutDown`].
pub fn shutdown() {
    SHARED_POOL.shutdown();
    IDENTITY_POOL.shutdown();
}
