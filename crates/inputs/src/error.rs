//! Input error types

use contracts::ContractError;
use thiserror::Error;

/// Errors seen by producers writing into an input
#[derive(Debug, Error)]
pub enum InputError {
    /// Input stopped accepting messages
    #[error("input '{input}' is closed")]
    Closed { input: String },

    /// Queue full (non-waiting submission)
    #[error("input '{input}' queue is full")]
    QueueFull { input: String },

    /// Dispatch ended without reporting an outcome
    #[error("input '{input}' dropped the dispatch outcome")]
    ReplyDropped { input: String },
}

impl From<InputError> for ContractError {
    fn from(err: InputError) -> Self {
        let input = match &err {
            InputError::Closed { input }
            | InputError::QueueFull { input }
            | InputError::ReplyDropped { input } => input.clone(),
        };
        ContractError::input(input, err.to_string())
    }
}

/// Input Result type alias
pub type Result<T> = std::result::Result<T, InputError>;
