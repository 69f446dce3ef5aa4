//! Dead-letter sinks: where tasks go once their retry budget is spent.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::core::{InboundUpdate, Result, WebhookError};

/// Durable record of an update that permanently failed processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub update_id: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
    /// Total handler attempts made (first attempt included).
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(update: &InboundUpdate, attempts: u32, last_error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            update_id: update.id().to_string(),
            payload: update.payload().clone(),
            received_at: update.received_at(),
            attempts,
            last_error: last_error.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Receives dead letters. Errors are logged by the queue and never propagate further.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: &DeadLetter) -> Result<()>;
}

/// Sink that only logs at error level.
#[derive(Debug, Clone, Default)]
pub struct TracingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for TracingDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<()> {
        error!(
            dead_letter_id = %letter.id,
            update_id = %letter.update_id,
            attempts = letter.attempts,
            last_error = %letter.last_error,
            "Update dead-lettered"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file. Writes are serialized and flushed per record.
#[derive(Debug)]
pub struct JsonlDeadLetterSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every dead letter back from the file. A missing file yields an empty list.
    pub async fn read_all(&self) -> Result<Vec<DeadLetter>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| -> Result<DeadLetter> {
                serde_json::from_str(line).map_err(|e| {
                    WebhookError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl DeadLetterSink for JsonlDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<()> {
        let mut line = serde_json::to_vec(letter)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
