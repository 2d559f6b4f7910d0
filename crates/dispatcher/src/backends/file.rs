//! FileBackend - appends one JSON line per publication

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use contracts::{Backend, ContractError, DeliveryError, Message, Value};
use serde_json::json;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

/// Backend that records publications in a JSON-lines file
pub struct FileBackend {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
    lines_written: AtomicU64,
}

impl FileBackend {
    /// Open (or create) `path` for appending
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let name = name.into();
        debug!(backend = %name, path = %path.display(), "FileBackend opened");
        Ok(Self {
            name,
            path,
            file: Mutex::new(file),
            lines_written: AtomicU64::new(0),
        })
    }

    /// Create from params map (for factory); requires `path`
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let path = params.get("path").ok_or_else(|| {
            ContractError::config_validation(
                format!("backends.{name}.params.path"),
                "file backend requires a path",
            )
        })?;
        Ok(Self::open(name, path).await?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_backend_publish",
        skip(self, destination, content, msg),
        fields(backend = %self.name, sender = %msg.sender)
    )]
    async fn publish(
        &self,
        destination: &str,
        content: &str,
        timestamp: i64,
        msg: &Message,
    ) -> Vec<DeliveryError> {
        let record = json!({
            "backend": self.name,
            "sender": msg.sender,
            "destination": destination,
            "content": content,
            "timestamp": timestamp,
        });
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => return vec![DeliveryError::source(e)],
        };
        line.push(b'\n');

        if let Err(e) = self.append(&line).await {
            error!(backend = %self.name, path = %self.path.display(), error = %e, "Append failed");
            return vec![DeliveryError::source(e)];
        }
        self.lines_written.fetch_add(1, Ordering::Relaxed);
        Vec::new()
    }

    fn status(&self) -> Value {
        json!({
            "type": "file",
            "path": self.path.display().to_string(),
            "lines_written": self.lines_written(),
        })
    }
}
