//! Pipeline — parses decoded work units and hands results to a sink.

use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use logtypes::{Finder, NormalizedResult, Registry};

use crate::decode::WorkUnit;
use crate::error::{ProcessError, SinkError};

/// Destination for normalized results.
///
/// Delivery is at-least-once: the same batch may be written again after a
/// redelivery, so sinks must tolerate duplicates.
pub trait Sink: Send + Sync {
    fn write<'a>(
        &'a self,
        results: &'a [NormalizedResult],
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

/// Newline-delimited JSON writer.
pub struct JsonLinesSink {
    out: Mutex<Pin<Box<dyn AsyncWrite + Send>>>,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self::from_writer(tokio::io::stdout())
    }

    /// Append to `path`, creating it if needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl AsyncWrite + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::pin(writer)),
        }
    }
}

impl Sink for JsonLinesSink {
    fn write<'a>(
        &'a self,
        results: &'a [NormalizedResult],
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let mut buf = Vec::new();
            for result in results {
                serde_json::to_writer(&mut buf, result)?;
                buf.push(b'\n');
            }
            let mut out = self.out.lock().await;
            out.write_all(&buf).await?;
            out.flush().await?;
            Ok(())
        })
    }
}

/// Collects results in memory.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<NormalizedResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<NormalizedResult> {
        self.results.lock().await.clone()
    }
}

impl Sink for MemorySink {
    fn write<'a>(
        &'a self,
        results: &'a [NormalizedResult],
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            self.results.lock().await.extend_from_slice(results);
            Ok(())
        })
    }
}

pub type UnitStream = Pin<Box<dyn Stream<Item = WorkUnit> + Send>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub units: usize,
    pub lines: usize,
    pub results: usize,
    pub parse_errors: usize,
}

pub trait Processor: Send + Sync {
    fn process<'a>(
        &'a self,
        units: UnitStream,
        sink: &'a dyn Sink,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ProcessStats, ProcessError>> + Send + 'a>>;
}

/// Resolves each unit's log type through the registry and parses its lines.
pub struct RegistryProcessor {
    registry: Arc<Registry>,
    /// Parser options keyed by log type
    options: BTreeMap<String, Value>,
}

impl RegistryProcessor {
    pub fn new(registry: Arc<Registry>, options: BTreeMap<String, Value>) -> Self {
        Self { registry, options }
    }

    fn parse_unit(&self, unit: &WorkUnit, stats: &mut ProcessStats) -> Result<Vec<NormalizedResult>, ProcessError> {
        let entry = self
            .registry
            .find(&unit.log_type)
            .ok_or_else(|| ProcessError::UnknownLogType(unit.log_type.clone()))?;
        let mut parser = entry
            .new_parser(self.options.get(&unit.log_type))
            .map_err(|source| ProcessError::Parser {
                log_type: unit.log_type.clone(),
                source,
            })?
            .with_source(unit.source_id.as_str(), unit.source_label.as_str());

        let mut results = Vec::new();
        for (index, line) in unit.lines.iter().enumerate() {
            stats.lines += 1;
            match parser.parse_log(line) {
                Ok(parsed) => results.extend(parsed),
                Err(e) => {
                    stats.parse_errors += 1;
                    warn!(
                        log_type = %unit.log_type,
                        source_id = %unit.source_id,
                        line = index,
                        error = %e,
                        "Skipping unparseable line"
                    );
                }
            }
        }
        Ok(results)
    }
}

impl Processor for RegistryProcessor {
    fn process<'a>(
        &'a self,
        mut units: UnitStream,
        sink: &'a dyn Sink,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ProcessStats, ProcessError>> + Send + 'a>> {
        Box::pin(async move {
            let mut stats = ProcessStats::default();
            while let Some(unit) = units.next().await {
                let results = self.parse_unit(&unit, &mut stats)?;
                stats.units += 1;
                stats.results += results.len();
                if !results.is_empty() {
                    sink.write(&results).await?;
                }
                debug!(log_type = %unit.log_type, results = results.len(), "Processed work unit");
            }
            Ok(stats)
        })
    }
}
