//! Spool — a directory-backed queue.
//!
//! Layout under the spool root:
//! - `pending/<name>.msg`: visible messages, delivered in name order
//! - `inflight/<deadline_ms>.<name>.msg`: received, invisible until the
//!   deadline passes; the file name is the receipt handle
//!
//! - `dead/<name>.msg`: bodies that are not valid UTF-8, set aside so they
//!   never block the messages behind them
//!
//! Expired inflight files move back to `pending/` on the next poll or
//! receive, which is the redelivery path for unacknowledged messages.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::{DeleteOutcome, Message, QueueDepth, QueueOps};
use crate::error::QueueError;

const MESSAGE_EXT: &str = ".msg";
const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_millis(500);

pub struct SpoolQueue {
    id: String,
    pending: PathBuf,
    inflight: PathBuf,
    dead: PathBuf,
    visibility: Duration,
    /// How long an empty receive waits for new messages before returning
    receive_wait: Duration,
    seq: AtomicU64,
}

impl SpoolQueue {
    pub async fn open(
        root: impl AsRef<Path>,
        id: impl Into<String>,
        visibility: Duration,
    ) -> Result<Self, QueueError> {
        let root = root.as_ref();
        let pending = root.join("pending");
        let inflight = root.join("inflight");
        let dead = root.join("dead");
        for dir in [&pending, &inflight, &dead] {
            tokio::fs::create_dir_all(dir).await?;
        }
        debug!(root = %root.display(), "Opened spool queue");

        Ok(Self {
            id: id.into(),
            pending,
            inflight,
            dead,
            visibility,
            receive_wait: DEFAULT_RECEIVE_WAIT,
            seq: AtomicU64::new(0),
        })
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }

    /// Append a message. Returns the message file name.
    pub async fn enqueue(&self, body: &str) -> Result<String, QueueError> {
        let name = format!(
            "{:020}-{}-{:08}{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed),
            MESSAGE_EXT
        );
        // Write then rename so receivers never see a partial body
        let tmp = self.pending.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, self.pending.join(&name)).await?;
        Ok(name)
    }

    async fn list(dir: &Path) -> Result<Vec<String>, QueueError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(MESSAGE_EXT) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Move expired inflight messages back to pending.
    async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut reclaimed = 0;
        for receipt in Self::list(&self.inflight).await? {
            let Some((deadline, name)) = split_receipt(&receipt) else {
                continue;
            };
            if deadline > now {
                continue;
            }
            match tokio::fs::rename(self.inflight.join(&receipt), self.pending.join(name)).await {
                Ok(()) => reclaimed += 1,
                // Deleted or reclaimed by a sibling in the meantime
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if reclaimed > 0 {
            debug!(queue = %self.id, reclaimed, "Reclaimed expired inflight messages");
        }
        Ok(reclaimed)
    }

    async fn take_pending(&self, max_batch: usize) -> Result<Vec<Message>, QueueError> {
        let deadline = Utc::now().timestamp_millis() + self.visibility.as_millis() as i64;
        let mut messages = Vec::new();
        for name in Self::list(&self.pending).await? {
            if messages.len() >= max_batch {
                break;
            }
            let receipt = format!("{}.{}", deadline, name);
            let inflight = self.inflight.join(&receipt);
            match tokio::fs::rename(self.pending.join(&name), &inflight).await {
                Ok(()) => {}
                // Taken by a sibling consumer
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            let bytes = tokio::fs::read(&inflight).await?;
            match String::from_utf8(bytes) {
                Ok(body) => messages.push(Message::new(body, receipt)),
                Err(e) => self.bury(&inflight, &name, &e.to_string()).await?,
            }
        }
        Ok(messages)
    }

    /// Move an undeliverable message out of the queue.
    async fn bury(&self, inflight: &Path, name: &str, reason: &str) -> Result<(), QueueError> {
        tokio::fs::rename(inflight, self.dead.join(name)).await?;
        warn!(
            queue = %self.id,
            file = name,
            error = reason,
            "Moved unreadable message to dead letter directory"
        );
        Ok(())
    }

    async fn delete_one(&self, receipt: &str) -> Result<(), QueueError> {
        if split_receipt(receipt).is_none() {
            return Err(QueueError::InvalidReceipt(receipt.to_string()));
        }
        match tokio::fs::remove_file(self.inflight.join(receipt)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(QueueError::ExpiredReceipt(receipt.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// `<deadline_ms>.<name>.msg` to `(deadline_ms, <name>.msg)`.
fn split_receipt(receipt: &str) -> Option<(i64, &str)> {
    let (deadline, name) = receipt.split_once('.')?;
    let deadline = deadline.parse().ok()?;
    let valid = name.ends_with(MESSAGE_EXT)
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..");
    valid.then_some((deadline, name))
}

impl QueueOps for SpoolQueue {
    fn queue_id(&self) -> &str {
        &self.id
    }

    fn poll_depth(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<QueueDepth, QueueError>> + Send + '_>> {
        Box::pin(async move {
            self.reclaim_expired().await?;
            Ok(QueueDepth {
                visible: Self::list(&self.pending).await?.len(),
                delayed: 0,
                in_flight: Self::list(&self.inflight).await?.len(),
            })
        })
    }

    fn receive(
        &self,
        max_batch: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Message>, QueueError>> + Send + '_>> {
        Box::pin(async move {
            self.reclaim_expired().await?;
            let messages = self.take_pending(max_batch).await?;
            if !messages.is_empty() || self.receive_wait.is_zero() {
                return Ok(messages);
            }

            // Emulate a long poll: wait once for new or expiring messages
            tokio::time::sleep(self.receive_wait).await;
            self.reclaim_expired().await?;
            let messages = self.take_pending(max_batch).await?;
            trace!(queue = %self.id, count = messages.len(), "Received after wait");
            Ok(messages)
        })
    }

    fn delete_batch<'a>(
        &'a self,
        receipts: &'a [String],
    ) -> Pin<Box<dyn std::future::Future<Output = DeleteOutcome> + Send + 'a>> {
        Box::pin(async move {
            let mut outcome = DeleteOutcome::default();
            for receipt in receipts {
                match self.delete_one(receipt).await {
                    Ok(()) => outcome.succeeded.push(receipt.clone()),
                    Err(e) => {
                        outcome.failed.push(receipt.clone());
                        outcome.error.get_or_insert(e);
                    }
                }
            }
            outcome
        })
    }
}
