// Log type catalogue: entries, groups, the registry and result normalization.

// Core contract
pub mod entry;
pub mod error;
pub mod schema;
pub mod result;

// Collections
pub mod group;
pub mod registry;

// Built-in formats
pub mod native;

#[cfg(any(test, feature = "testing"))]
pub mod logtesting;

// Re-export commonly used types
pub use entry::{ConfigParser, Desc, Entry, EntryBuilder, EventParser, LogParser, ParserConfig, RawEvent};
pub use error::{ConfigError, ParseError, RegistryError};
pub use group::{append_find, build_group, merge, Finder, Group, LogTypes};
pub use native::json::ConfigJson;
pub use registry::Registry;
pub use result::{FieldId, FieldSet, NormalizedResult};
pub use schema::{FieldKind, FieldSpec, Schema};
