//! Boot — logging init, config load, registry validation, consumer wiring.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logtypes::LogTypes;

use crate::conf::ProcessorConfig;
use crate::decode::EnvelopeDecoder;
use crate::pipeline::{JsonLinesSink, RegistryProcessor, Sink};
use crate::queue::SpoolQueue;
use crate::scale::{LocalScaler, Scaler};
use crate::stream::{StreamConsumer, StreamSettings};

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "log_processor=info,processor=info,logtypes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything one invocation needs.
pub struct Invocation {
    pub consumer: Arc<StreamConsumer>,
    pub scaler: Arc<LocalScaler>,
    pub config: ProcessorConfig,
}

/// Load and validate config, then assemble the consumer.
pub async fn boot() -> Result<Invocation, Box<dyn std::error::Error>> {
    info!("Starting log processor v{}", env!("CARGO_PKG_VERSION"));

    let config = ProcessorConfig::load()?;
    info!(
        "Loaded configuration: queue_id={}, spool_dir={}",
        config.queue_id, config.spool_dir
    );
    assemble(config).await
}

/// Build the registry, queue, sink and consumer for `config`.
///
/// Every native parser must accept its default options and every configured
/// parser option must name a known log type, otherwise boot fails.
pub async fn assemble(config: ProcessorConfig) -> Result<Invocation, Box<dyn std::error::Error>> {
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let registry = logtypes::native::registry()?;
    let parsers = registry.available_parsers().map_err(|e| {
        error!("Native log types failed validation: {}", e);
        e
    })?;
    config.validate_parsers(&registry).map_err(|e| {
        error!("Invalid parser options: {}", e);
        e
    })?;
    info!("Registered {} log types", registry.len());

    let queue = SpoolQueue::open(&config.spool_dir, config.queue_id.as_str(), config.visibility_timeout()).await?;
    info!("Opened spool queue at {}", config.spool_dir);

    let sink: Arc<dyn Sink> = match &config.output {
        Some(path) => {
            info!("Writing results to {}", path);
            Arc::new(JsonLinesSink::create(path).await?)
        }
        None => Arc::new(JsonLinesSink::stdout()),
    };

    let scaler = Arc::new(LocalScaler::new(config.max_siblings, config.invocation_budget()));
    let consumer = Arc::new(StreamConsumer::new(
        Arc::new(queue),
        Arc::new(EnvelopeDecoder),
        Arc::new(RegistryProcessor::new(Arc::new(registry), config.parsers.clone())),
        sink,
        Arc::clone(&scaler) as Arc<dyn Scaler>,
        StreamSettings::from(&config),
    ));
    scaler.bind(&consumer);
    info!(
        parsers = parsers.len(),
        max_siblings = config.max_siblings,
        "Consumer ready"
    );

    Ok(Invocation {
        consumer,
        scaler,
        config,
    })
}
