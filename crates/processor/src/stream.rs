//! Stream — the deadline-bounded consumer loop.
//!
//! One invocation of [`StreamConsumer::run`] repeats
//! poll depth → scale check → receive → decode → process → delete
//! until the queue drains, the processing deadline passes, or a fatal
//! error occurs. Messages are deleted only after their batch was processed,
//! so a failed batch is redelivered by the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::conf::ProcessorConfig;
use crate::decode::Decoder;
use crate::error::StreamError;
use crate::pipeline::{Processor, Sink, UnitStream};
use crate::queue::QueueOps;
use crate::scale::Scaler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub max_batch_size: usize,
    /// Depth above which each iteration requests one sibling
    pub scale_threshold: usize,
    pub processing_time_divisor: u32,
}

impl From<&ProcessorConfig> for StreamSettings {
    fn from(config: &ProcessorConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            scale_threshold: config.scale_threshold,
            processing_time_divisor: config.processing_time_divisor,
        }
    }
}

/// Deadline for starting new iterations: the remaining budget divided by
/// `divisor` is held back so the last delete can still complete.
pub fn processing_deadline(deadline: Instant, now: Instant, divisor: u32) -> Instant {
    let remaining = deadline.saturating_duration_since(now);
    let margin: Duration = remaining / divisor.max(1);
    deadline.checked_sub(margin).unwrap_or(now)
}

pub struct StreamConsumer {
    queue: Arc<dyn QueueOps>,
    decoder: Arc<dyn Decoder>,
    processor: Arc<dyn Processor>,
    sink: Arc<dyn Sink>,
    scaler: Arc<dyn Scaler>,
    settings: StreamSettings,
}

impl StreamConsumer {
    pub fn new(
        queue: Arc<dyn QueueOps>,
        decoder: Arc<dyn Decoder>,
        processor: Arc<dyn Processor>,
        sink: Arc<dyn Sink>,
        scaler: Arc<dyn Scaler>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            queue,
            decoder,
            processor,
            sink,
            scaler,
            settings,
        }
    }

    pub fn queue_id(&self) -> &str {
        self.queue.queue_id()
    }

    /// Run one invocation. Returns the number of messages processed and
    /// handed to delete.
    ///
    /// Reaching the deadline is a normal exit. Messages whose delete failed
    /// still count; the queue redelivers them.
    pub async fn run(&self, deadline: Instant) -> Result<usize, StreamError> {
        let stop_at = processing_deadline(deadline, Instant::now(), self.settings.processing_time_divisor);
        let queue_id = self.queue.queue_id().to_string();
        let mut total = 0;

        loop {
            if Instant::now() >= stop_at {
                info!(queue = %queue_id, total, "Processing deadline reached");
                break;
            }

            // ── Scale check ──
            let depth = self.queue.poll_depth().await.map_err(|source| {
                let err = StreamError::Poll {
                    queue: queue_id.clone(),
                    source,
                };
                error!(error = %err, "Stream invocation failed");
                err
            })?;
            let mut last = false;
            if depth.total() > self.settings.scale_threshold {
                debug!(queue = %queue_id, depth = depth.total(), "Queue depth above threshold, scaling up");
                if let Err(e) = self.scaler.scale_up() {
                    warn!(queue = %queue_id, error = %e, "Failed to scale up");
                }
            } else {
                last = true;
            }

            // ── Receive ──
            let messages = self
                .queue
                .receive(self.settings.max_batch_size)
                .await
                .map_err(|source| {
                    let err = StreamError::Receive {
                        queue: queue_id.clone(),
                        source,
                    };
                    error!(error = %err, "Stream invocation failed");
                    err
                })?;
            if messages.is_empty() {
                if last {
                    break;
                }
                continue;
            }

            // ── Decode, then process ──
            let bodies: Vec<String> = messages.iter().map(|m| m.body.clone()).collect();
            let units = self.decoder.decode(&bodies).map_err(|e| {
                error!(queue = %queue_id, error = %e, "Failed to decode messages");
                StreamError::from(e)
            })?;
            let units: UnitStream = Box::pin(tokio_stream::iter(units));
            let stats = self
                .processor
                .process(units, self.sink.as_ref())
                .await
                .map_err(|e| {
                    error!(queue = %queue_id, error = %e, "Failed to process messages");
                    StreamError::from(e)
                })?;
            debug!(
                queue = %queue_id,
                messages = messages.len(),
                results = stats.results,
                parse_errors = stats.parse_errors,
                "Processed batch"
            );

            // ── Delete ──
            let receipts: Vec<String> = messages.iter().map(|m| m.receipt_handle.clone()).collect();
            let outcome = self.queue.delete_batch(&receipts).await;
            if !outcome.is_complete() {
                let error = outcome.error.as_ref().map(ToString::to_string).unwrap_or_default();
                warn!(
                    guidance = "failed messages will be reprocessed",
                    queue = %queue_id,
                    num_failed = outcome.failed.len(),
                    num_succeeded = outcome.succeeded.len(),
                    error = %error,
                    "failure deleting queue messages"
                );
            }

            total += messages.len();
            // A full batch may have left more behind; poll again
            if last && messages.len() < self.settings.max_batch_size {
                break;
            }
        }

        info!(queue = %queue_id, total, "Stream invocation finished");
        Ok(total)
    }
}
