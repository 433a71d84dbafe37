use thiserror::Error;

use logtypes::ConfigError;

/// Queue transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue I/O error: {0}")]
    Io(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Receipt handle expired: {0}")]
    ExpiredReceipt(String),

    #[error("Queue transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Io(err.to_string())
    }
}

/// Message bodies that cannot be turned into work units.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid notification body: {0}")]
    InvalidBody(String),

    #[error("notification is missing {0:?}")]
    MissingField(&'static str),

    /// Failure reading the data a notification points at
    #[error("{0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unknown log type {0:?}")]
    UnknownLogType(String),

    #[error("failed to create {log_type} parser: {source}")]
    Parser {
        log_type: String,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("scaler is not bound to a consumer")]
    Unbound,

    #[error("no async runtime available to spawn a sibling")]
    NoRuntime,

    #[error("sibling invocation aborted: {0}")]
    Join(String),
}

/// Fatal errors ending one consumer invocation.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failure polling depth of {queue}: {source}")]
    Poll {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("failure receiving messages from {queue}: {source}")]
    Receive {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Scale(#[from] ScaleError),
}
