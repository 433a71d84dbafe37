//! Invoke — run one deadline-bounded invocation and wait for its siblings.

use tokio::time::Instant;
use tracing::{error, info};

use crate::error::StreamError;
use crate::runtime::boot::Invocation;

/// Totals of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationSummary {
    pub own: usize,
    pub siblings: usize,
}

impl InvocationSummary {
    pub fn total(&self) -> usize {
        self.own + self.siblings
    }
}

/// Run the consumer until its deadline of `now + invocation budget`.
///
/// Siblings are always joined, even when this invocation failed, so none
/// outlives the process. The first failure wins.
pub async fn invoke(invocation: Invocation) -> Result<InvocationSummary, StreamError> {
    let Invocation {
        consumer,
        scaler,
        config,
    } = invocation;

    let started = Instant::now();
    let deadline = started + config.invocation_budget();
    info!(
        queue = %consumer.queue_id(),
        budget_secs = config.invocation_budget_secs,
        "Starting invocation"
    );

    let own = consumer.run(deadline).await;
    let siblings = scaler.join().await;

    let summary = InvocationSummary {
        own: own?,
        siblings: siblings?,
    };
    info!(
        processed = summary.own,
        siblings = summary.siblings,
        total = summary.total(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Invocation complete"
    );
    Ok(summary)
}

/// Like [`invoke`], logging a failure before returning it.
pub async fn invoke_logged(invocation: Invocation) -> Result<InvocationSummary, StreamError> {
    invoke(invocation).await.map_err(|e| {
        error!("Invocation failed: {}", e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::ProcessorConfig;
    use crate::queue::{QueueOps, SpoolQueue};
    use crate::runtime::boot::assemble;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invocation_drains_spool() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        let output = dir.path().join("out.jsonl");
        let config = ProcessorConfig {
            spool_dir: spool.display().to_string(),
            output: Some(output.display().to_string()),
            max_batch_size: 2,
            invocation_budget_secs: 30,
            ..ProcessorConfig::default()
        };

        let producer = SpoolQueue::open(&spool, "producer", Duration::from_secs(30)).await.unwrap();
        producer
            .enqueue(r#"{"logType":"Syslog.RFC3164","sourceId":"s1","lines":["<13>Feb  5 17:32:18 gw one","<13>Feb  5 17:32:19 gw two"]}"#)
            .await
            .unwrap();
        producer
            .enqueue(r#"{"logType":"Apache.AccessCommon","data":"1.1.1.1 - - [10/Oct/2000:13:55:36 -0700] \"GET / HTTP/1.0\" 200 1\n"}"#)
            .await
            .unwrap();

        let summary = invoke(assemble(config).await.unwrap()).await.unwrap();
        assert_eq!(summary, InvocationSummary { own: 2, siblings: 0 });

        let written = tokio::fs::read_to_string(&output).await.unwrap();
        assert_eq!(written.lines().count(), 3);
        assert_eq!(producer.poll_depth().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_message_stays_queued() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        let config = ProcessorConfig {
            spool_dir: spool.display().to_string(),
            output: Some(dir.path().join("out.jsonl").display().to_string()),
            ..ProcessorConfig::default()
        };

        let producer = SpoolQueue::open(&spool, "producer", Duration::from_secs(30)).await.unwrap();
        producer.enqueue("not json").await.unwrap();

        let err = invoke_logged(assemble(config).await.unwrap()).await.unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
        assert_eq!(producer.poll_depth().await.unwrap().in_flight, 1, "inflight until visibility expires");
    }
}
