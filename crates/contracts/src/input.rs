//! Input trait - transport adapter interface

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ContractError, DispatchError, Message};

/// Routing entry point handed to Inputs
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Run the filter chain and fan-out for one message
    async fn route(&self, msg: Message) -> DispatchError;
}

/// Transport adapter producing messages
#[async_trait]
pub trait Input: Send + Sync {
    /// Input name (used for logging)
    fn name(&self) -> &str;

    /// Run the input loop
    ///
    /// Calls `handler.route` for every inbound message and returns only
    /// after [`Input::stop`] has been called (or the transport ended).
    async fn start(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ContractError>;

    /// Stop the input loop, unblocking [`Input::start`]
    async fn stop(&self) -> Result<(), ContractError>;
}
