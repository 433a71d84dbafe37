// Queue-driven log processor: consumes notifications, parses and normalizes
// the referenced log lines, and acknowledges them once written.

// Core infrastructure
pub mod conf;
pub mod error;
pub mod queue;

// Processing
pub mod decode;
pub mod pipeline;
pub mod scale;
pub mod stream;

// Process lifecycle
pub mod runtime;

pub use conf::ProcessorConfig;
pub use decode::{Decoder, EnvelopeDecoder, WorkUnit};
pub use error::{DecodeError, ProcessError, QueueError, ScaleError, SinkError, StreamError};
pub use pipeline::{JsonLinesSink, MemorySink, ProcessStats, Processor, RegistryProcessor, Sink};
pub use queue::{DeleteOutcome, Message, QueueDepth, QueueOps};
pub use scale::{LocalScaler, NoopScaler, Scaler};
pub use stream::{processing_deadline, StreamConsumer, StreamSettings};
