//! Scale — fan-out of sibling consumer invocations under load.
//!
//! The consumer calls [`Scaler::scale_up`] once per iteration in which the
//! queue depth exceeds its threshold. The call never blocks the loop: a
//! sibling is started in the background, or the request is dropped.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{ScaleError, StreamError};
use crate::stream::StreamConsumer;

pub trait Scaler: Send + Sync {
    /// Request one more concurrent worker. Fire-and-forget.
    fn scale_up(&self) -> Result<(), ScaleError>;
}

/// Single-worker operation: every request is accepted and ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScaler;

impl Scaler for NoopScaler {
    fn scale_up(&self) -> Result<(), ScaleError> {
        Ok(())
    }
}

/// Runs siblings as tasks on the current tokio runtime.
///
/// Each sibling is an independent invocation of the bound consumer with its
/// own deadline of `now + budget`. At most `max_siblings` run at once; a
/// request beyond that is dropped.
pub struct LocalScaler {
    consumer: OnceLock<Weak<StreamConsumer>>,
    permits: Arc<Semaphore>,
    max_siblings: usize,
    budget: Duration,
    siblings: Mutex<JoinSet<Result<usize, StreamError>>>,
}

impl LocalScaler {
    pub fn new(max_siblings: usize, budget: Duration) -> Self {
        Self {
            consumer: OnceLock::new(),
            permits: Arc::new(Semaphore::new(max_siblings)),
            max_siblings,
            budget,
            siblings: Mutex::new(JoinSet::new()),
        }
    }

    /// Attach the consumer siblings will run. The scaler only holds a weak
    /// reference since the consumer itself owns the scaler.
    ///
    /// Returns false if a consumer was already bound.
    pub fn bind(&self, consumer: &Arc<StreamConsumer>) -> bool {
        self.consumer.set(Arc::downgrade(consumer)).is_ok()
    }

    /// Wait for every sibling, including ones started while waiting.
    ///
    /// Returns the total number of messages siblings processed, or the first
    /// sibling failure once all of them have finished.
    pub async fn join(&self) -> Result<usize, StreamError> {
        let mut total = 0;
        let mut first_err = None;
        loop {
            let mut running = std::mem::replace(&mut *self.siblings.lock(), JoinSet::new());
            if running.is_empty() {
                break;
            }
            while let Some(joined) = running.join_next().await {
                match joined {
                    Ok(Ok(count)) => total += count,
                    Ok(Err(e)) => {
                        error!(error = %e, "Sibling invocation failed");
                        first_err.get_or_insert(e);
                    }
                    Err(e) => {
                        error!(error = %e, "Sibling invocation aborted");
                        first_err.get_or_insert(StreamError::Scale(ScaleError::Join(e.to_string())));
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

impl Scaler for LocalScaler {
    fn scale_up(&self) -> Result<(), ScaleError> {
        let consumer = self
            .consumer
            .get()
            .and_then(Weak::upgrade)
            .ok_or(ScaleError::Unbound)?;

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            debug!(max_siblings = self.max_siblings, "Sibling limit reached, skipping scale-up");
            return Ok(());
        };
        let handle = Handle::try_current().map_err(|_| ScaleError::NoRuntime)?;

        let deadline = Instant::now() + self.budget;
        self.siblings.lock().spawn_on(
            async move {
                let _permit = permit;
                consumer.run(deadline).await
            },
            &handle,
        );
        info!(
            running = self.max_siblings - self.permits.available_permits(),
            "Started sibling invocation"
        );
        Ok(())
    }
}
