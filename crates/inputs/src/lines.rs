//! LinesInput - newline-delimited JSON messages from an async reader

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use contracts::{ContractError, Input, Message, MessageHandler};

use crate::metrics::InputMetrics;

/// Input reading one JSON [`Message`] per line
///
/// Lines are dispatched in order, one at a time. Blank lines are skipped and
/// malformed lines are logged and counted. The run loop ends at EOF or on
/// `stop`; a dispatch in progress always completes.
pub struct LinesInput<R> {
    name: String,
    reader: Mutex<Option<R>>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    metrics: Arc<InputMetrics>,
}

impl LinesInput<BufReader<Stdin>> {
    /// Read messages from standard input
    pub fn stdin(name: impl Into<String>) -> Self {
        Self::new(name, BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LinesInput<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        Self {
            name: name.into(),
            reader: Mutex::new(Some(reader)),
            started: AtomicBool::new(false),
            shutdown,
            finished,
            metrics: Arc::new(InputMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<InputMetrics> {
        &self.metrics
    }

    async fn handle_line(&self, line: &str, handler: &Arc<dyn MessageHandler>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let msg: Message = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                self.metrics.record_parse_error(&self.name);
                warn!(input = %self.name, error = %e, "Skipping malformed message");
                return;
            }
        };
        self.metrics.record_received(&self.name);

        let sender = msg.sender.clone();
        let outcome = handler.route(msg).await;
        self.metrics.record_outcome(&outcome);

        if outcome.is_ok() {
            debug!(input = %self.name, sender = %sender, "Message dispatched");
        } else {
            let report = serde_json::to_string(&outcome).unwrap_or_else(|_| outcome.to_string());
            warn!(
                input = %self.name,
                sender = %sender,
                outcome = %report,
                "Message not fully delivered"
            );
        }
    }

    fn finish(&self) {
        self.finished.send_replace(true);
    }
}

#[async_trait]
impl<R> Input for LinesInput<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "lines_input_run", skip(self, handler), fields(input = %self.name))]
    async fn start(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ContractError> {
        let Some(reader) = self.reader.lock().await.take() else {
            return Err(ContractError::InputAlreadyRunning {
                input: self.name.clone(),
            });
        };
        self.started.store(true, Ordering::SeqCst);
        info!(input = %self.name, "Lines input started");

        let mut lines = reader.lines();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!(input = %self.name, "Lines input stopped");
                    break;
                }
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => self.handle_line(&line, &handler).await,
                Ok(None) => {
                    info!(input = %self.name, "Lines input reached EOF");
                    break;
                }
                Err(e) => {
                    self.finish();
                    return Err(ContractError::input(&self.name, e.to_string()));
                }
            }
        }

        self.finish();
        Ok(())
    }

    #[instrument(name = "lines_input_stop", skip(self), fields(input = %self.name))]
    async fn stop(&self) -> Result<(), ContractError> {
        self.shutdown.send_replace(true);
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut finished = self.finished.subscribe();
        finished
            .wait_for(|done| *done)
            .await
            .map_err(|e| ContractError::input(&self.name, e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DeliveryError, DispatchError};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingHandler {
        senders: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn route(&self, msg: Message) -> DispatchError {
            self.senders.lock().unwrap().push(msg.sender.clone());
            let mut outcome = DispatchError::new();
            if msg.has_label("BROKEN") {
                outcome.record_backend_error("BROKEN", DeliveryError::publish("down"));
            }
            outcome
        }
    }

    #[tokio::test]
    async fn test_reads_until_eof() {
        let data = concat!(
            r#"{"sender":"first","labels":{"LOG":"a"}}"#,
            "\n",
            "\n",
            "not json\n",
            r#"{"sender":"second","labels":{"BROKEN":"b"}}"#,
            "\n",
        );
        let input = LinesInput::new("lines", data.as_bytes());
        let handler = Arc::new(RecordingHandler::default());

        input
            .start(Arc::clone(&handler) as Arc<dyn MessageHandler>)
            .await
            .unwrap();

        assert_eq!(*handler.senders.lock().unwrap(), vec!["first", "second"]);
        let snapshot = input.metrics().snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.parse_errors, 1);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.failed, 1);

        // Ended by EOF; stopping afterwards is a no-op.
        input.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_unblocks_idle_reader() {
        let (client, server) = tokio::io::duplex(64);
        let input = Arc::new(LinesInput::new("pipe", BufReader::new(server)));
        let handler: Arc<dyn MessageHandler> = Arc::new(RecordingHandler::default());

        let run = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.start(handler).await })
        };
        while !input.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        input.stop().await.unwrap();
        run.await.unwrap().unwrap();
        drop(client);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let input = LinesInput::new("lines", &b""[..]);
        let handler: Arc<dyn MessageHandler> = Arc::new(RecordingHandler::default());

        input.start(Arc::clone(&handler)).await.unwrap();
        assert!(matches!(
            input.start(handler).await,
            Err(ContractError::InputAlreadyRunning { .. })
        ));
    }
}
