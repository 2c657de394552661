//! Bounded pool of long-lived executors for fan-out jobs.
//!
//! The pool has no queue: the work channel is a rendezvous channel, so a
//! submission either lands on an executor that is parked in `recv` right
//! now or is rejected immediately. Back-pressure is the caller's problem,
//! which is exactly what the dispatcher wants — it drops the job and counts
//! a `worker_fail` instead of blocking a request handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// One unit of work: a fan-out job ready to run.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors returned by [`WorkerPool::run`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// The pool is not in the running state.
    #[error("worker pool isn't running")]
    NotStarted,

    /// No executor was ready to take the job.
    #[error("worker pool failed to queue a job")]
    QueueFull,
}

/// Lifecycle states, strictly ordered; transitions never skip or revisit a
/// state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Closing = 3,
    Closed = 4,
}

/// Bounded set of executors consuming jobs from a shared rendezvous
/// channel.
///
/// `start` and `close` are effective exactly once; calling them in any
/// other state is an operator error that is logged and ignored.
pub struct WorkerPool {
    n: usize,
    tx: flume::Sender<Job>,
    rx: flume::Receiver<Job>,
    state: AtomicU8,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool of `n` executors. Nothing runs until [`start`].
    ///
    /// [`start`]: WorkerPool::start
    pub fn new(n: usize) -> Self {
        let (tx, rx) = flume::bounded(0);
        Self {
            n,
            tx,
            rx,
            state: AtomicU8::new(State::Idle as u8),
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Spawns the executors. Only valid from the idle state.
    pub fn start(&self) {
        if !self.transition(State::Idle, State::Starting) {
            error!("worker pool start ignored: invalid state");
            return;
        }
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for _ in 0..self.n {
            let rx = self.rx.clone();
            let token = self.token.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        job = rx.recv_async() => match job {
                            Ok(job) => job.await,
                            Err(_) => break,
                        },
                        _ = token.cancelled() => break,
                    }
                }
            }));
        }
        debug!(workers = self.n, "worker pool running");
        self.state.store(State::Running as u8, Ordering::Release);
    }

    /// Submits a job without blocking.
    ///
    /// Fails with [`WorkerError::NotStarted`] unless the pool is running,
    /// and with [`WorkerError::QueueFull`] when no executor is parked on
    /// the channel at this instant.
    pub fn run(&self, job: Job) -> Result<(), WorkerError> {
        if self.state.load(Ordering::Acquire) != State::Running as u8 {
            return Err(WorkerError::NotStarted);
        }
        self.tx.try_send(job).map_err(|_| WorkerError::QueueFull)
    }

    /// Cancels the executors and waits for in-flight jobs to finish.
    /// Only valid from the running state.
    pub async fn close(&self) {
        if !self.transition(State::Running, State::Closing) {
            error!("worker pool close ignored: invalid state");
            return;
        }
        self.token.cancel();
        let handles: Vec<_> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        self.state.store(State::Closed as u8, Ordering::Release);
        debug!("worker pool closed");
    }
}
