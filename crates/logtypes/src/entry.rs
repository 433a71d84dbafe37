//! Entry — the descriptor binding a log type name to its parser factory.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ParseError, RegistryError};
use crate::result::{FieldSet, NormalizedResult, Normalizer};
use crate::schema::Schema;

/// Opaque parser options. `None`, `null` and `{}` all mean defaults.
pub type ParserConfig = Value;

/// Decode parser options into a typed struct.
///
/// Option structs are expected to use `#[serde(default, deny_unknown_fields)]`
/// so typos surface as configuration errors.
pub fn decode_options<T>(config: Option<&ParserConfig>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    match config {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::InvalidOptions(e.to_string())),
        Some(other) => Err(ConfigError::InvalidOptions(format!(
            "expected an option table, got {}",
            other
        ))),
    }
}

/// One event produced by a leaf parser, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub fields: Map<String, Value>,
    pub event_time: Option<DateTime<Utc>>,
    pub row_id: Option<String>,
}

impl RawEvent {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            event_time: None,
            row_id: None,
        }
    }

    pub fn at(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = Some(event_time);
        self
    }
}

/// Leaf grammar contract implemented by every log format.
pub trait EventParser: Send {
    /// Parse one raw line into zero or more events.
    fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError>;
}

pub trait ParserFactory: Send + Sync {
    fn new_parser(&self, config: Option<&ParserConfig>) -> Result<Box<dyn EventParser>, ConfigError>;
}

impl<F> ParserFactory for F
where
    F: Fn(Option<&ParserConfig>) -> Result<Box<dyn EventParser>, ConfigError> + Send + Sync,
{
    fn new_parser(&self, config: Option<&ParserConfig>) -> Result<Box<dyn EventParser>, ConfigError> {
        self(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Desc {
    /// `"<Prefix>.<Name>"`, globally unique
    pub name: String,
    pub description: String,
    pub reference_url: String,
}

impl Desc {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        reference_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            reference_url: reference_url.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut parts = self.name.split('.');
        let valid = match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(name), None) => is_ident(prefix) && is_ident(name),
            _ => false,
        };
        if !valid {
            return Err(format!("name {:?} must have the form <Prefix>.<Name>", self.name));
        }
        if self.description.trim().is_empty() {
            return Err("missing description".to_string());
        }
        if self.reference_url.trim().is_empty() {
            return Err("missing reference URL".to_string());
        }
        Ok(())
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Immutable log type descriptor. Identity is the name.
#[derive(Clone)]
pub struct Entry {
    desc: Desc,
    schema: Schema,
    indicators: FieldSet,
    factory: Arc<dyn ParserFactory>,
}

impl Entry {
    pub fn new(desc: Desc, schema: Schema, factory: Arc<dyn ParserFactory>) -> Result<Self, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidEntry {
            name: desc.name.clone(),
            reason,
        };
        desc.validate().map_err(invalid)?;
        schema.validate().map_err(invalid)?;

        let indicators = FieldSet::from_schema(&schema);
        Ok(Self {
            desc,
            schema,
            indicators,
            factory,
        })
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn describe(&self) -> &Desc {
        &self.desc
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn indicators(&self) -> &FieldSet {
        &self.indicators
    }

    pub fn new_parser(&self, config: Option<&ParserConfig>) -> Result<LogParser, ConfigError> {
        let events = self.factory.new_parser(config)?;
        Ok(LogParser {
            events,
            normalizer: Normalizer::new(self.desc.name.clone(), &self.schema),
        })
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.desc.name)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("desc", &self.desc)
            .field("indicators", &self.indicators)
            .finish_non_exhaustive()
    }
}

/// A stateful parser for one log type, producing normalized results.
pub struct LogParser {
    events: Box<dyn EventParser>,
    normalizer: Normalizer,
}

impl LogParser {
    pub fn with_source(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.normalizer = self.normalizer.with_source(id, label);
        self
    }

    pub fn log_type(&self) -> &str {
        self.normalizer.log_type()
    }

    /// Parse one raw line. An empty vector is a valid outcome (filtered line).
    pub fn parse_log(&mut self, line: &str) -> Result<Vec<NormalizedResult>, ParseError> {
        let events = self.events.parse_events(line)?;
        let mut last: Option<DateTime<Utc>> = None;
        let results = events
            .into_iter()
            .map(|event| {
                let mut parse_time = Utc::now();
                if let Some(prev) = last {
                    parse_time = parse_time.max(prev);
                }
                last = Some(parse_time);
                self.normalizer.normalize(event, parse_time)
            })
            .collect();
        Ok(results)
    }
}

/// Anything that can produce a finalized [`Entry`].
pub trait EntryBuilder {
    fn build_entry(&self) -> Result<Entry, RegistryError>;
}

impl EntryBuilder for Entry {
    fn build_entry(&self) -> Result<Entry, RegistryError> {
        Ok(self.clone())
    }
}

/// Binds a hand-written grammar to a descriptor and schema.
#[derive(Clone)]
pub struct ConfigParser {
    pub desc: Desc,
    pub schema: Schema,
    pub factory: Arc<dyn ParserFactory>,
}

impl EntryBuilder for ConfigParser {
    fn build_entry(&self) -> Result<Entry, RegistryError> {
        Entry::new(self.desc.clone(), self.schema.clone(), Arc::clone(&self.factory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use serde::Deserialize;
    use serde_json::json;

    /// Splits a line on commas, one event per token.
    struct SplitParser;

    impl EventParser for SplitParser {
        fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError> {
            if line.contains('!') {
                return Err(ParseError::InvalidFormat("bang".into()));
            }
            Ok(line
                .split(',')
                .filter(|t| !t.is_empty())
                .map(|t| {
                    let mut fields = Map::new();
                    fields.insert("token".into(), json!(t));
                    RawEvent::new(fields)
                })
                .collect())
        }
    }

    fn split_entry(name: &str) -> Result<Entry, RegistryError> {
        let factory = |_: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
            Ok(Box::new(SplitParser))
        };
        Entry::new(
            Desc::new(name, "Comma separated tokens", "https://example.com/split"),
            Schema::new().field(FieldSpec::new("token", FieldKind::String)),
            Arc::new(factory),
        )
    }

    #[test]
    fn test_desc_validation() {
        assert!(Desc::new("Syslog.RFC5424", "d", "u").validate().is_ok());
        assert!(Desc::new("Syslog", "d", "u").validate().is_err());
        assert!(Desc::new("A.B.C", "d", "u").validate().is_err());
        assert!(Desc::new(".B", "d", "u").validate().is_err());
        assert!(Desc::new("A.B-C", "d", "u").validate().is_err());
        assert!(Desc::new("A.B", "", "u").validate().is_err());
        assert!(Desc::new("A.B", "d", " ").validate().is_err());
    }

    #[test]
    fn test_entry_rejects_invalid_desc() {
        let err = split_entry("NoPrefix").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEntry { .. }));
    }

    #[test]
    fn test_entry_display_is_name() {
        let entry = split_entry("Test.Split").unwrap();
        assert_eq!(entry.to_string(), "Test.Split");
        assert_eq!(entry.describe().prefix(), "Test");
    }

    #[test]
    fn test_parse_log_expands_and_filters() {
        let entry = split_entry("Test.Split").unwrap();
        let mut parser = entry.new_parser(None).unwrap();

        let results = parser.parse_log("a,b,c").unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.core.log_type == "Test.Split"));

        let results = parser.parse_log("").unwrap();
        assert!(results.is_empty(), "filtered line is not an error");

        assert!(parser.parse_log("a!").is_err());
    }

    #[test]
    fn test_parse_times_non_decreasing_within_call() {
        let entry = split_entry("Test.Split").unwrap();
        let mut parser = entry.new_parser(None).unwrap().with_source("s1", "label");
        let results = parser.parse_log("a,b,c,d,e,f,g,h").unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].core.parse_time <= pair[1].core.parse_time);
        }
        assert!(results.iter().all(|r| r.core.source_id == "s1"));
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct Options {
        limit: usize,
    }

    #[test]
    fn test_decode_options() {
        let opts: Options = decode_options(None).unwrap();
        assert_eq!(opts.limit, 0);

        let opts: Options = decode_options(Some(&json!({"limit": 5}))).unwrap();
        assert_eq!(opts.limit, 5);

        let err = decode_options::<Options>(Some(&json!({"limt": 5}))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOptions(_)));

        assert!(decode_options::<Options>(Some(&json!("limit"))).is_err());
    }
}
