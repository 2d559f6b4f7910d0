//! ChannelInput - in-process input with request/response handles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use contracts::{ContractError, DispatchError, Input, Message, MessageHandler};

use crate::error::{InputError, Result};
use crate::metrics::InputMetrics;

/// Queued message plus the slot its outcome is reported to
type Envelope = (Message, Option<oneshot::Sender<DispatchError>>);

/// Input fed by [`ChannelInputHandle`]s
///
/// Each queued message is dispatched on its own task, so a slow backend does
/// not hold up later messages. `stop` closes the queue; messages already
/// queued are still dispatched.
pub struct ChannelInput {
    name: Arc<str>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    started: AtomicBool,
    finished: watch::Sender<bool>,
    metrics: Arc<InputMetrics>,
}

impl ChannelInput {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let (finished, _) = watch::channel(false);
        Self {
            name: Arc::from(name.into()),
            tx,
            rx,
            started: AtomicBool::new(false),
            finished,
            metrics: Arc::new(InputMetrics::new()),
        }
    }

    /// Producer handle; any number may be created
    pub fn handle(&self) -> ChannelInputHandle {
        ChannelInputHandle {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
        }
    }

    pub fn metrics(&self) -> &Arc<InputMetrics> {
        &self.metrics
    }

    fn log_join(&self, joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            error!(input = %self.name, error = %e, "Dispatch task failed");
        }
    }
}

#[async_trait]
impl Input for ChannelInput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "channel_input_run", skip(self, handler), fields(input = %self.name))]
    async fn start(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> std::result::Result<(), ContractError> {
        if self.started.swap(true, Ordering::SeqCst) {
            if *self.finished.borrow() {
                return Err(ContractError::input(self.name.as_ref(), "input already finished"));
            }
            return Err(ContractError::InputAlreadyRunning {
                input: self.name.to_string(),
            });
        }
        info!(input = %self.name, "Channel input started");

        let mut tasks = JoinSet::new();
        while let Ok((msg, reply)) = self.rx.recv().await {
            self.metrics.record_received(&self.name);

            let handler = Arc::clone(&handler);
            let metrics = Arc::clone(&self.metrics);
            tasks.spawn(async move {
                let outcome = handler.route(msg).await;
                metrics.record_outcome(&outcome);
                if let Some(reply) = reply {
                    // Producer may have given up waiting.
                    let _ = reply.send(outcome);
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                self.log_join(joined);
            }
        }

        debug!(input = %self.name, pending = tasks.len(), "Queue closed, awaiting dispatches");
        while let Some(joined) = tasks.join_next().await {
            self.log_join(joined);
        }

        self.finished.send_replace(true);
        info!(input = %self.name, "Channel input finished");
        Ok(())
    }

    #[instrument(name = "channel_input_stop", skip(self), fields(input = %self.name))]
    async fn stop(&self) -> std::result::Result<(), ContractError> {
        self.tx.close();
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut finished = self.finished.subscribe();
        finished
            .wait_for(|done| *done)
            .await
            .map_err(|e| ContractError::input(self.name.as_ref(), e.to_string()))?;
        Ok(())
    }
}

/// Producer side of a [`ChannelInput`]
#[derive(Clone)]
pub struct ChannelInputHandle {
    name: Arc<str>,
    tx: Sender<Envelope>,
}

impl ChannelInputHandle {
    /// Queue `msg` and wait for its dispatch outcome
    pub async fn send(&self, msg: Message) -> Result<DispatchError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send((msg, Some(reply)))
            .await
            .map_err(|_| self.closed())?;
        outcome.await.map_err(|_| InputError::ReplyDropped {
            input: self.name.to_string(),
        })
    }

    /// Queue `msg` without waiting for the outcome
    pub async fn submit(&self, msg: Message) -> Result<()> {
        self.tx.send((msg, None)).await.map_err(|_| self.closed())
    }

    /// Queue `msg` only if there is room right now
    pub fn try_submit(&self, msg: Message) -> Result<()> {
        self.tx.try_send((msg, None)).map_err(|e| match e {
            TrySendError::Full(_) => InputError::QueueFull {
                input: self.name.to_string(),
            },
            TrySendError::Closed(_) => self.closed(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed(&self) -> InputError {
        InputError::Closed {
            input: self.name.to_string(),
        }
    }
}
