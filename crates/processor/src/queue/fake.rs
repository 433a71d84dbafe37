//! Fake — scripted test double for queue operations.
//!
//! Provides a deterministic [`FakeQueue`] that implements [`QueueOps`]
//! from queued answers. When a script runs dry the fake reports an empty
//! queue, returns no messages, and acknowledges every delete.

use std::collections::VecDeque;
use std::pin::Pin;

use tokio::sync::Mutex;

use super::{DeleteOutcome, Message, QueueDepth, QueueOps};
use crate::error::QueueError;

/// A recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PollDepth,
    Receive(usize),
    Delete(Vec<String>),
}

/// Mutable inner state protected by a mutex.
#[derive(Default)]
struct Inner {
    depths: VecDeque<Result<QueueDepth, QueueError>>,
    receives: VecDeque<Result<Vec<Message>, QueueError>>,
    deletes: VecDeque<DeleteOutcome>,
    calls: Vec<Call>,
}

pub struct FakeQueue {
    id: String,
    inner: Mutex<Inner>,
}

impl FakeQueue {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn push_depth(&self, visible: usize, delayed: usize) {
        self.inner
            .lock()
            .await
            .depths
            .push_back(Ok(QueueDepth {
                visible,
                delayed,
                in_flight: 0,
            }));
    }

    pub async fn push_depth_error(&self, err: QueueError) {
        self.inner.lock().await.depths.push_back(Err(err));
    }

    pub async fn push_receive(&self, messages: Vec<Message>) {
        self.inner.lock().await.receives.push_back(Ok(messages));
    }

    pub async fn push_receive_error(&self, err: QueueError) {
        self.inner.lock().await.receives.push_back(Err(err));
    }

    pub async fn push_delete(&self, outcome: DeleteOutcome) {
        self.inner.lock().await.deletes.push_back(outcome);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Every receipt handle passed to `delete_batch`, in call order.
    pub async fn deleted(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Delete(receipts) => Some(receipts.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

// ── QueueOps implementation ─────────────────────────────────────

impl QueueOps for FakeQueue {
    fn queue_id(&self) -> &str {
        &self.id
    }

    fn poll_depth(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<QueueDepth, QueueError>> + Send + '_>> {
        Box::pin(async {
            let mut state = self.inner.lock().await;
            state.calls.push(Call::PollDepth);
            state.depths.pop_front().unwrap_or(Ok(QueueDepth::default()))
        })
    }

    fn receive(
        &self,
        max_batch: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Message>, QueueError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.calls.push(Call::Receive(max_batch));
            let mut answer = state.receives.pop_front().unwrap_or(Ok(Vec::new()));
            if let Ok(messages) = &mut answer {
                messages.truncate(max_batch);
            }
            answer
        })
    }

    fn delete_batch<'a>(
        &'a self,
        receipts: &'a [String],
    ) -> Pin<Box<dyn std::future::Future<Output = DeleteOutcome> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.calls.push(Call::Delete(receipts.to_vec()));
            state
                .deletes
                .pop_front()
                .unwrap_or_else(|| DeleteOutcome::all_succeeded(receipts))
        })
    }
}
