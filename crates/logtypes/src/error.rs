use thiserror::Error;

/// Failures while building groups or mutating the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate entry {0:?}")]
    DuplicateEntry(String),

    #[error("invalid entry {name:?}: {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("failed to create {name:?} parser with default options: {source}")]
    DefaultParser {
        name: String,
        #[source]
        source: ConfigError,
    },
}

/// Rejected parser options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parser options: {0}")]
    InvalidOptions(String),

    #[error("missing required parser option: {0}")]
    MissingOption(String),
}

/// A raw line that a parser could not turn into events.
///
/// Parse errors are never transient; callers record and skip the line.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Line too large: {0} bytes (max: {1} bytes)")]
    LineTooLarge(usize, usize),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid timestamp {value:?} in field {field:?}")]
    InvalidTimestamp { field: String, value: String },
}
