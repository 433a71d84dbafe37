//! Model — ProcessorConfig.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub queue_id: String,
    pub spool_dir: String,
    /// Results file; stdout when unset
    pub output: Option<String>,
    pub max_batch_size: usize,
    pub scale_threshold: usize,
    pub processing_time_divisor: u32,
    pub invocation_budget_secs: u64,
    pub visibility_timeout_secs: u64,
    pub max_siblings: usize,
    /// Parser options keyed by log type
    pub parsers: BTreeMap<String, Value>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue_id: "log-processor".to_string(),
            spool_dir: "/var/spool/log-processor".to_string(),
            output: None,
            max_batch_size: 10,
            scale_threshold: 100,
            processing_time_divisor: 2,
            invocation_budget_secs: 300,
            visibility_timeout_secs: 30,
            max_siblings: 4,
            parsers: BTreeMap::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn invocation_budget(&self) -> Duration {
        Duration::from_secs(self.invocation_budget_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}
