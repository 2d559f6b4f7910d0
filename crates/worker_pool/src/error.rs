//! Worker pool error types

use thiserror::Error;

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every worker is busy
    #[error("pool '{pool}' has no idle worker")]
    NoMoreWorker { pool: String },

    /// No worker became idle before the deadline
    #[error("pool '{pool}' had no idle worker within {waited_ms}ms")]
    Timeout { pool: String, waited_ms: u64 },

    /// Submission before `start` or after `stop`
    #[error("pool '{pool}' is not running")]
    NotRunning { pool: String },

    /// `start` while a previous `stop` is still draining workers
    #[error("pool '{pool}' is still stopping")]
    Stopping { pool: String },

    /// A worker task could not be joined during `stop`
    #[error("pool '{pool}' worker {worker} failed to join: {message}")]
    WorkerJoin {
        pool: String,
        worker: usize,
        message: String,
    },
}

/// Worker pool Result type alias
pub type Result<T> = std::result::Result<T, PoolError>;
