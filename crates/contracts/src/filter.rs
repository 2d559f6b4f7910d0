//! Filter trait - one step of the routing chain

use async_trait::async_trait;

use crate::{DispatchError, Message};

/// Routing step that inspects or mutates a message
///
/// Filters run strictly in order. A filter aborts the chain by calling
/// [`DispatchError::set_filtered`] on `outcome`; otherwise the next filter
/// sees the (possibly mutated) message.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Filter name, reported in `filter_info` when it aborts
    fn name(&self) -> &str;

    async fn filter(&self, msg: &mut Message, outcome: &mut DispatchError);
}
