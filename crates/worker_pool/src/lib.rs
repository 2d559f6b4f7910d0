//! # Worker Pool
//!
//! Fixed-capacity pool of reusable workers.
//!
//! Responsibilities:
//! - Cap the number of concurrently running tasks at the pool capacity
//! - Fail fast (`submit`), wait (`submit_blocking`) or wait with a deadline
//!   (`submit_with_timeout`) when every worker is busy
//! - Contain panicking tasks so a worker always returns to the idle set
//! - Drain in-flight tasks on `stop`, and allow `start` again afterwards

mod error;
mod pool;

pub use error::{PoolError, Result};
pub use pool::{BoundedWorkerPool, PoolStatistics, Task};
