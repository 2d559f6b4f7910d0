//! BoundedWorkerPool - fixed set of workers behind an idle queue
//!
//! ```text
//!   submit(task) ──► idle queue ──► WorkerSlot ──hand-off──► worker N ─► task
//!                      ▲                                        │
//!                      └──────────── re-enqueue when done ──────┘
//! ```
//!
//! The idle queue is a bounded MPMC queue holding one slot per idle worker.
//! Taking a slot reserves that worker; the task is handed over through the
//! slot's one-shot channel. A busy worker has no slot in the queue.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{Receiver, Sender, TryRecvError};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PoolError, Result};

/// Unit of work executed by a worker
pub type Task = BoxFuture<'static, ()>;

/// Reservation of one idle worker
struct WorkerSlot {
    id: usize,
    hand_off: oneshot::Sender<Task>,
}

/// Live worker set
struct Workers {
    idle: Receiver<WorkerSlot>,
    handles: Vec<(usize, JoinHandle<()>)>,
}

/// Outcome of a stop, `None` while workers are still draining
type StopOutcome = watch::Receiver<Option<Result<()>>>;

/// Lifecycle of the worker set
///
/// `Stopping` lasts until every old worker has exited, so a new worker set
/// can never overlap the draining one.
enum PoolState {
    Stopped,
    Running(Workers),
    Stopping { total: usize, done: StopOutcome },
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatistics {
    /// Workers waiting for a task
    pub idle: usize,
    /// Workers in the pool
    pub total: usize,
}

impl PoolStatistics {
    /// Workers currently running a task
    pub fn busy(&self) -> usize {
        self.total.saturating_sub(self.idle)
    }
}

/// Fixed-capacity pool of reusable workers
///
/// At most `capacity` submitted tasks run at once. There is no task queue:
/// a full pool rejects (`submit`) or makes the caller wait
/// (`submit_blocking`, `submit_with_timeout`).
pub struct BoundedWorkerPool {
    name: Arc<str>,
    capacity: usize,
    state: Arc<Mutex<PoolState>>,
}

impl BoundedWorkerPool {
    /// Create an inactive pool
    ///
    /// A capacity of 0 yields a pool that never accepts work.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: Arc::from(name.into()),
            capacity,
            state: Arc::new(Mutex::new(PoolState::Stopped)),
        }
    }

    /// Pool name (used for logging and errors)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed worker count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True from `start` until a `stop` has joined every worker
    pub fn is_running(&self) -> bool {
        !matches!(*self.lock(), PoolState::Stopped)
    }

    /// Spawn the workers; no-op while running
    ///
    /// Must be called from within a tokio runtime. After a `stop`, the same
    /// worker ids `0..capacity` are spawned again.
    ///
    /// # Errors
    /// - `Stopping` while a `stop` is still waiting for the old workers
    #[instrument(
        name = "worker_pool_start",
        skip(self),
        fields(pool = %self.name, capacity = self.capacity)
    )]
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock();
        match *state {
            PoolState::Running(_) => {
                debug!(pool = %self.name, "Worker pool already running");
                return Ok(());
            }
            PoolState::Stopping { .. } => {
                warn!(pool = %self.name, "Worker pool is still stopping");
                return Err(PoolError::Stopping {
                    pool: self.name.to_string(),
                });
            }
            PoolState::Stopped => {}
        }

        let (idle_tx, idle_rx) = async_channel::bounded(self.capacity.max(1));
        let mut handles = Vec::with_capacity(self.capacity);

        for id in 0..self.capacity {
            let (hand_off, first) = oneshot::channel();
            // Queue capacity equals the worker count, so pre-filling never fails.
            if idle_tx.try_send(WorkerSlot { id, hand_off }).is_err() {
                break;
            }
            let handle = tokio::spawn(worker_loop(
                Arc::clone(&self.name),
                id,
                first,
                idle_tx.clone(),
            ));
            handles.push((id, handle));
        }

        info!(pool = %self.name, workers = handles.len(), "Worker pool started");
        *state = PoolState::Running(Workers {
            idle: idle_rx,
            handles,
        });
        Ok(())
    }

    /// Stop every worker after its current task and wait for all of them
    ///
    /// Idempotent. In-flight tasks run to completion; nothing is cancelled.
    /// Concurrent callers all wait for the same drain. The drain runs on its
    /// own task, so dropping this future does not leave the pool half stopped.
    #[instrument(name = "worker_pool_stop", skip(self), fields(pool = %self.name))]
    pub async fn stop(&self) -> Result<()> {
        let mut done = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, PoolState::Stopped) {
                PoolState::Stopped => {
                    debug!(pool = %self.name, "Worker pool not running");
                    return Ok(());
                }
                PoolState::Stopping { total, done } => {
                    let waiting = done.clone();
                    *state = PoolState::Stopping { total, done };
                    waiting
                }
                PoolState::Running(workers) => {
                    let (tx, done) = watch::channel(None);
                    *state = PoolState::Stopping {
                        total: workers.handles.len(),
                        done: done.clone(),
                    };
                    tokio::spawn(drain(
                        Arc::clone(&self.name),
                        Arc::clone(&self.state),
                        workers,
                        tx,
                    ));
                    done
                }
            }
        };

        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Err(PoolError::WorkerJoin {
                pool: self.name.to_string(),
                worker: 0,
                message: "drain task ended without reporting".to_string(),
            }),
        };
        outcome
    }

    /// Hand `task` to an idle worker without waiting
    ///
    /// # Errors
    /// - `NoMoreWorker` if every worker is busy
    /// - `NotRunning` before `start` / after `stop`
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let idle = self.idle_queue()?;
        match idle.try_recv() {
            Ok(slot) => self.assign(slot, Box::pin(task)),
            Err(TryRecvError::Empty) => Err(PoolError::NoMoreWorker {
                pool: self.name.to_string(),
            }),
            Err(TryRecvError::Closed) => Err(self.not_running()),
        }
    }

    /// Hand `task` to the next worker that becomes idle
    ///
    /// # Errors
    /// - `NotRunning` before `start`, or if the pool stops while waiting
    pub async fn submit_blocking<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let idle = self.idle_queue()?;
        let slot = idle.recv().await.map_err(|_| self.not_running())?;
        self.assign(slot, Box::pin(task))
    }

    /// As [`submit_blocking`](Self::submit_blocking), giving up after `timeout`
    ///
    /// # Errors
    /// - `Timeout` if no worker became idle in time
    /// - `NotRunning` before `start`, or if the pool stops while waiting
    pub async fn submit_with_timeout<F>(&self, task: F, timeout: Duration) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let idle = self.idle_queue()?;
        match tokio::time::timeout(timeout, idle.recv()).await {
            Ok(Ok(slot)) => self.assign(slot, Box::pin(task)),
            Ok(Err(_)) => Err(self.not_running()),
            Err(_) => Err(PoolError::Timeout {
                pool: self.name.to_string(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Idle and total worker counts; `(0, 0)` when stopped
    ///
    /// While stopping, every remaining worker counts as busy.
    pub fn statistics(&self) -> PoolStatistics {
        match &*self.lock() {
            PoolState::Running(workers) => PoolStatistics {
                idle: workers.idle.len(),
                total: workers.handles.len(),
            },
            PoolState::Stopping { total, .. } => PoolStatistics {
                idle: 0,
                total: *total,
            },
            PoolState::Stopped => PoolStatistics::default(),
        }
    }

    fn assign(&self, slot: WorkerSlot, task: Task) -> Result<()> {
        let worker = slot.id;
        slot.hand_off.send(task).map_err(|_| {
            error!(pool = %self.name, worker, "Reserved worker is gone");
            self.not_running()
        })
    }

    fn idle_queue(&self) -> Result<Receiver<WorkerSlot>> {
        match &*self.lock() {
            PoolState::Running(workers) => Ok(workers.idle.clone()),
            _ => Err(self.not_running()),
        }
    }

    fn not_running(&self) -> PoolError {
        PoolError::NotRunning {
            pool: self.name.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        lock_state(&self.state)
    }
}

// The lock is never held across a panic point, so poisoning carries no
// broken invariant.
fn lock_state(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Close the idle queue, join every worker, then mark the pool stopped
async fn drain(
    pool: Arc<str>,
    state: Arc<Mutex<PoolState>>,
    workers: Workers,
    done: watch::Sender<Option<Result<()>>>,
) {
    // Idle workers exit when their slot is dropped; busy workers exit when
    // re-enqueueing into the closed queue fails.
    workers.idle.close();
    while let Ok(slot) = workers.idle.try_recv() {
        drop(slot);
    }

    let mut failure = None;
    for (id, handle) in workers.handles {
        if let Err(e) = handle.await {
            error!(pool = %pool, worker = id, error = %e, "Worker failed to join");
            failure.get_or_insert(PoolError::WorkerJoin {
                pool: pool.to_string(),
                worker: id,
                message: e.to_string(),
            });
        }
    }

    *lock_state(&state) = PoolState::Stopped;
    info!(pool = %pool, "Worker pool stopped");
    done.send_replace(Some(failure.map_or(Ok(()), Err)));
}

async fn worker_loop(
    pool: Arc<str>,
    id: usize,
    first: oneshot::Receiver<Task>,
    idle: Sender<WorkerSlot>,
) {
    debug!(pool = %pool, worker = id, "Worker started");

    let mut next = first;
    while let Ok(task) = next.await {
        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            error!(
                pool = %pool,
                worker = id,
                panic = %panic_message(panic.as_ref()),
                "Task panicked, worker returns to idle"
            );
        }

        let (hand_off, rx) = oneshot::channel();
        if idle.send(WorkerSlot { id, hand_off }).await.is_err() {
            break;
        }
        next = rx;
    }

    debug!(pool = %pool, worker = id, "Worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
