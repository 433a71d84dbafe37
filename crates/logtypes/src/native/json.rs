//! JSON-per-line log types.
//!
//! [`ConfigJson`] builds an entry for any format whose raw records are one
//! JSON object per line. The schema decides where the event time lives.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::entry::{decode_options, Desc, Entry, EntryBuilder, EventParser, ParserConfig, RawEvent};
use crate::error::{ConfigError, ParseError, RegistryError};
use crate::schema::{lookup, Schema};

/// Largest accepted JSON event (1MB)
pub const MAX_EVENT_SIZE: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonOptions {
    /// Maximum raw line size in bytes
    pub max_event_size: usize,
    /// Reject events whose event-time field is missing
    pub require_event_time: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            max_event_size: MAX_EVENT_SIZE,
            require_event_time: false,
        }
    }
}

/// Entry builder for JSON-per-line formats.
#[derive(Debug, Clone)]
pub struct ConfigJson {
    pub desc: Desc,
    pub schema: Schema,
    /// Defaults used when a parser is created without options
    pub options: JsonOptions,
}

impl ConfigJson {
    pub fn new(desc: Desc, schema: Schema) -> Self {
        Self {
            desc,
            schema,
            options: JsonOptions::default(),
        }
    }
}

impl EntryBuilder for ConfigJson {
    fn build_entry(&self) -> Result<Entry, RegistryError> {
        let defaults = self.options.clone();
        let time_field = self.schema.event_time_field().map(str::to_string);
        let factory = move |config: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
            let options = match config {
                None => defaults.clone(),
                Some(_) => decode_options::<JsonOptions>(config)?,
            };
            if options.max_event_size == 0 {
                return Err(ConfigError::InvalidOptions("max_event_size must be positive".into()));
            }
            if options.require_event_time && time_field.is_none() {
                return Err(ConfigError::MissingOption("event time field".into()));
            }
            Ok(Box::new(JsonParser {
                options,
                time_field: time_field.clone(),
            }))
        };
        Entry::new(self.desc.clone(), self.schema.clone(), Arc::new(factory))
    }
}

struct JsonParser {
    options: JsonOptions,
    time_field: Option<String>,
}

impl EventParser for JsonParser {
    fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        if line.len() > self.options.max_event_size {
            return Err(ParseError::LineTooLarge(line.len(), self.options.max_event_size));
        }

        let fields: Map<String, Value> = match serde_json::from_str(line) {
            Ok(Value::Object(obj)) => obj,
            Ok(_) => return Err(ParseError::InvalidJson("expected a JSON object".into())),
            Err(e) => return Err(ParseError::InvalidJson(e.to_string())),
        };

        let mut event_time = None;
        if let Some(field) = &self.time_field {
            match lookup(&fields, field) {
                Some(value) => {
                    let t = parse_timestamp(value).ok_or_else(|| ParseError::InvalidTimestamp {
                        field: field.clone(),
                        value: value.to_string(),
                    })?;
                    event_time = Some(t);
                }
                None if self.options.require_event_time => {
                    return Err(ParseError::InvalidFormat(format!("missing event time field {:?}", field)));
                }
                None => {}
            }
        }

        Ok(vec![RawEvent {
            fields,
            event_time,
            row_id: None,
        }])
    }
}

/// Interpret a JSON value as a timestamp: RFC3339 strings, or unix seconds or
/// milliseconds as numbers or numeric strings.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_unix),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(from_unix)),
        _ => None,
    }
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::FieldId;
    use crate::schema::{FieldKind, FieldSpec};
    use chrono::TimeZone;
    use serde_json::json;

    fn builder() -> ConfigJson {
        ConfigJson::new(
            Desc::new("Test.Json", "JSON test logs", "https://example.com/json"),
            Schema::new()
                .field(FieldSpec::new("ts", FieldKind::Timestamp))
                .field(FieldSpec::new("client", FieldKind::String).indicator(FieldId::IpAddress))
                .event_time("ts"),
        )
    }

    #[test]
    fn test_parse_object_with_event_time() {
        let entry = builder().build_entry().unwrap();
        let mut parser = entry.new_parser(None).unwrap();
        let results = parser
            .parse_log(r#"{"ts":"2020-05-01T12:00:00Z","client":"10.1.1.1","msg":"ok"}"#)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].core.event_time,
            Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap()
        );
        assert!(results[0].values(FieldId::IpAddress).unwrap().contains("10.1.1.1"));
    }

    #[test]
    fn test_unix_timestamps() {
        let at = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!(1588334400)), Some(at));
        assert_eq!(parse_timestamp(&json!(1588334400000i64)), Some(at));
        assert_eq!(parse_timestamp(&json!("1588334400")), Some(at));
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn test_rejects_non_object_and_malformed() {
        let entry = builder().build_entry().unwrap();
        let mut parser = entry.new_parser(None).unwrap();
        assert!(matches!(parser.parse_log("[1,2]"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(parser.parse_log(r#"{"ts":"#), Err(ParseError::InvalidJson(_))));
        assert!(matches!(
            parser.parse_log(r#"{"ts":"yesterday"}"#),
            Err(ParseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_blank_line_is_filtered() {
        let entry = builder().build_entry().unwrap();
        let mut parser = entry.new_parser(None).unwrap();
        assert!(parser.parse_log("   ").unwrap().is_empty());
    }

    #[test]
    fn test_options() {
        let entry = builder().build_entry().unwrap();

        let mut parser = entry.new_parser(Some(&json!({"max_event_size": 16}))).unwrap();
        assert!(matches!(
            parser.parse_log(r#"{"client":"10.1.1.1","msg":"too long"}"#),
            Err(ParseError::LineTooLarge(_, 16))
        ));

        let mut parser = entry.new_parser(Some(&json!({"require_event_time": true}))).unwrap();
        assert!(parser.parse_log(r#"{"msg":"no time"}"#).is_err());

        assert!(entry.new_parser(Some(&json!({"max_size": 1}))).is_err());
        assert!(entry.new_parser(Some(&json!({"max_event_size": 0}))).is_err());
    }
}
