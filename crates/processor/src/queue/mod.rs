//! Queue — the transport contract the consumer pulls notifications from.
//!
//! `spool.rs` provides a directory-backed implementation.
//! `fake.rs` provides a scripted test double.

pub mod fake;
pub mod spool;

use std::pin::Pin;

use crate::error::QueueError;

pub use fake::FakeQueue;
pub use spool::SpoolQueue;

/// One received notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    /// Ack token passed back to `delete_batch`
    pub receipt_handle: String,
}

impl Message {
    pub fn new(body: impl Into<String>, receipt_handle: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receipt_handle: receipt_handle.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: usize,
    /// Scheduled for later delivery
    pub delayed: usize,
    /// Received but not yet acknowledged. Already owned by a consumer, so
    /// not part of [`QueueDepth::total`].
    pub in_flight: usize,
}

impl QueueDepth {
    /// Backlog that no consumer has picked up yet.
    pub fn total(&self) -> usize {
        self.visible + self.delayed
    }
}

/// Result of a batch delete. Deletion is a set operation; order is not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub failed: Vec<String>,
    pub succeeded: Vec<String>,
    pub error: Option<QueueError>,
}

impl DeleteOutcome {
    pub fn all_succeeded(receipts: &[String]) -> Self {
        Self {
            succeeded: receipts.to_vec(),
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.error.is_none()
    }
}

/// Async interface over a message queue.
///
/// Object-safe thanks to `Pin<Box<…>>` returns.
/// Implementations must be `Send + Sync` so they can be shared between sibling consumers.
pub trait QueueOps: Send + Sync {
    fn queue_id(&self) -> &str;

    fn poll_depth(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<QueueDepth, QueueError>> + Send + '_>>;

    /// Receive up to `max_batch` messages. An empty batch is not an error.
    fn receive(
        &self,
        max_batch: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Message>, QueueError>> + Send + '_>>;

    fn delete_batch<'a>(
        &'a self,
        receipts: &'a [String],
    ) -> Pin<Box<dyn std::future::Future<Output = DeleteOutcome> + Send + 'a>>;
}
