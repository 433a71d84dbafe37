//! Result normalization.
//!
//! Every parsed event becomes a [`NormalizedResult`]: a flat JSON object
//! carrying the `p_*` core fields, the indicator values harvested from the
//! schema-tagged fields, and the event fields themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::entry::RawEvent;
use crate::schema::{lookup, Schema};

pub const FIELD_LOG_TYPE: &str = "p_log_type";
pub const FIELD_EVENT_TIME: &str = "p_event_time";
pub const FIELD_PARSE_TIME: &str = "p_parse_time";
pub const FIELD_ROW_ID: &str = "p_row_id";
pub const FIELD_SOURCE_ID: &str = "p_source_id";
pub const FIELD_SOURCE_LABEL: &str = "p_source_label";

/// Kinds of searchable values extracted from events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    IpAddress,
    DomainName,
    Md5Hash,
    Sha1Hash,
    Sha256Hash,
    Username,
}

impl FieldId {
    pub const ALL: [FieldId; 6] = [
        FieldId::IpAddress,
        FieldId::DomainName,
        FieldId::Md5Hash,
        FieldId::Sha1Hash,
        FieldId::Sha256Hash,
        FieldId::Username,
    ];

    pub fn json_name(&self) -> &'static str {
        match self {
            FieldId::IpAddress => "p_any_ip_addresses",
            FieldId::DomainName => "p_any_domain_names",
            FieldId::Md5Hash => "p_any_md5_hashes",
            FieldId::Sha1Hash => "p_any_sha1_hashes",
            FieldId::Sha256Hash => "p_any_sha256_hashes",
            FieldId::Username => "p_any_usernames",
        }
    }

    pub fn from_json_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.json_name() == name)
    }

    /// Validate and canonicalize a candidate value; `None` drops it.
    fn normalize_value(&self, raw: &str) -> Option<String> {
        let value = raw.trim();
        if value.is_empty() || value == "-" {
            return None;
        }
        match self {
            FieldId::IpAddress => value
                .parse::<IpAddr>()
                .or_else(|_| value.parse::<SocketAddr>().map(|s| s.ip()))
                .ok()
                .map(|ip| ip.to_string()),
            FieldId::DomainName => {
                if value.contains(char::is_whitespace) {
                    None
                } else {
                    Some(value.trim_end_matches('.').to_ascii_lowercase())
                }
            }
            FieldId::Md5Hash => hex_of_len(value, 32),
            FieldId::Sha1Hash => hex_of_len(value, 40),
            FieldId::Sha256Hash => hex_of_len(value, 64),
            FieldId::Username => Some(value.to_string()),
        }
    }
}

fn hex_of_len(value: &str, len: usize) -> Option<String> {
    if value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(value.to_ascii_lowercase())
    } else {
        None
    }
}

/// Order-insensitive set of indicator kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeSet<FieldId>);

impl FieldSet {
    pub fn from_schema(schema: &Schema) -> Self {
        schema.indicator_fields().map(|(_, id)| id).collect()
    }

    /// Derive the set from the `p_any_*` keys present in a JSON document.
    pub fn from_json(value: &Value) -> Self {
        value
            .as_object()
            .map(|obj| obj.keys().filter_map(|k| FieldId::from_json_name(k)).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: FieldId) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreFields {
    pub log_type: String,
    pub event_time: DateTime<Utc>,
    pub parse_time: DateTime<Utc>,
    pub row_id: String,
    pub source_id: String,
    pub source_label: String,
}

/// Uniform output record for one parsed event.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub core: CoreFields,
    pub indicators: BTreeMap<FieldId, BTreeSet<String>>,
    pub event: Map<String, Value>,
}

impl NormalizedResult {
    pub fn values(&self, id: FieldId) -> Option<&BTreeSet<String>> {
        self.indicators.get(&id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl Serialize for NormalizedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(FIELD_LOG_TYPE, &self.core.log_type)?;
        map.serialize_entry(FIELD_EVENT_TIME, &format_time(&self.core.event_time))?;
        map.serialize_entry(FIELD_PARSE_TIME, &format_time(&self.core.parse_time))?;
        map.serialize_entry(FIELD_ROW_ID, &self.core.row_id)?;
        if !self.core.source_id.is_empty() {
            map.serialize_entry(FIELD_SOURCE_ID, &self.core.source_id)?;
        }
        if !self.core.source_label.is_empty() {
            map.serialize_entry(FIELD_SOURCE_LABEL, &self.core.source_label)?;
        }
        for (id, values) in &self.indicators {
            if !values.is_empty() {
                map.serialize_entry(id.json_name(), values)?;
            }
        }
        // Event keys never shadow the core fields
        for (key, value) in &self.event {
            if !key.starts_with("p_") {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Fresh row identifier (UUIDv4, simple hex form).
pub fn new_row_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Turns raw events of one log type into normalized results.
#[derive(Debug, Clone)]
pub struct Normalizer {
    log_type: String,
    indicators: FieldSet,
    indicator_fields: Vec<(String, FieldId)>,
    source_id: String,
    source_label: String,
}

impl Normalizer {
    pub fn new(log_type: impl Into<String>, schema: &Schema) -> Self {
        Self {
            log_type: log_type.into(),
            indicators: FieldSet::from_schema(schema),
            indicator_fields: schema
                .indicator_fields()
                .map(|(path, id)| (path.to_string(), id))
                .collect(),
            source_id: String::new(),
            source_label: String::new(),
        }
    }

    pub fn with_source(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.source_id = id.into();
        self.source_label = label.into();
        self
    }

    pub fn log_type(&self) -> &str {
        &self.log_type
    }

    pub fn indicators(&self) -> &FieldSet {
        &self.indicators
    }

    pub fn normalize(&self, event: RawEvent, parse_time: DateTime<Utc>) -> NormalizedResult {
        let row_id = event
            .row_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_row_id);
        let event_time = event
            .event_time
            .filter(|t| t.timestamp_nanos_opt() != Some(0))
            .unwrap_or(parse_time);

        let mut indicators: BTreeMap<FieldId, BTreeSet<String>> = BTreeMap::new();
        for (path, id) in &self.indicator_fields {
            let Some(value) = lookup(&event.fields, path) else {
                continue;
            };
            for candidate in string_values(value) {
                if let Some(v) = id.normalize_value(candidate) {
                    indicators.entry(*id).or_default().insert(v);
                }
            }
        }

        NormalizedResult {
            core: CoreFields {
                log_type: self.log_type.clone(),
                event_time,
                parse_time,
                row_id,
                source_id: self.source_id.clone(),
                source_label: self.source_label.clone(),
            },
            indicators,
            event: event.fields,
        }
    }
}

fn string_values(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use chrono::TimeZone;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field(FieldSpec::new("time", FieldKind::Timestamp))
            .field(FieldSpec::new("addr.remote", FieldKind::String).indicator(FieldId::IpAddress))
            .field(FieldSpec::new("host", FieldKind::String).indicator(FieldId::DomainName))
            .field(FieldSpec::new("users", FieldKind::Object).indicator(FieldId::Username))
            .event_time("time")
    }

    fn event(value: Value) -> RawEvent {
        RawEvent::new(value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_event_time_defaults_to_parse_time() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let now = Utc::now();
        let result = normalizer.normalize(event(json!({"msg": "x"})), now);
        assert_eq!(result.core.event_time, result.core.parse_time);
        assert_eq!(result.core.parse_time, now);
    }

    #[test]
    fn test_event_time_kept_when_present() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let at = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        let result = normalizer.normalize(event(json!({})).at(at), Utc::now());
        assert_eq!(result.core.event_time, at);
    }

    #[test]
    fn test_zero_event_time_treated_as_absent() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let now = Utc::now();
        let zero = Utc.timestamp_opt(0, 0).unwrap();
        let result = normalizer.normalize(event(json!({})).at(zero), now);
        assert_eq!(result.core.event_time, now);
    }

    #[test]
    fn test_row_ids_generated_and_distinct() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let mut seen = BTreeSet::new();
        for _ in 0..1000 {
            let result = normalizer.normalize(event(json!({})), Utc::now());
            assert!(!result.core.row_id.is_empty());
            assert!(seen.insert(result.core.row_id), "row id collision");
        }
    }

    #[test]
    fn test_parser_supplied_row_id_kept() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let mut raw = event(json!({}));
        raw.row_id = Some("abc".to_string());
        assert_eq!(normalizer.normalize(raw, Utc::now()).core.row_id, "abc");
    }

    #[test]
    fn test_indicator_extraction() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let raw = event(json!({
            "addr": {"remote": "192.168.1.7:3022"},
            "host": "Node-1.Example.com.",
            "users": ["alice", "bob", "-"],
        }));
        let result = normalizer.normalize(raw, Utc::now());

        let ips: Vec<_> = result.values(FieldId::IpAddress).unwrap().iter().cloned().collect();
        assert_eq!(ips, vec!["192.168.1.7"]);
        let domains: Vec<_> = result.values(FieldId::DomainName).unwrap().iter().cloned().collect();
        assert_eq!(domains, vec!["node-1.example.com"]);
        let users: Vec<_> = result.values(FieldId::Username).unwrap().iter().cloned().collect();
        assert_eq!(users, vec!["alice", "bob"]);
    }

    #[test]
    fn test_absent_and_invalid_indicators_omitted() {
        let normalizer = Normalizer::new("Test.Event", &schema());
        let raw = event(json!({"addr": {"remote": "not-an-ip"}}));
        let result = normalizer.normalize(raw, Utc::now());
        assert!(result.indicators.is_empty());

        let json: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert!(json.get("p_any_ip_addresses").is_none());
        assert!(json.get("p_any_domain_names").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let normalizer = Normalizer::new("Test.Event", &schema()).with_source("src-1", "prod");
        let at = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        let mut raw = event(json!({"host": "example.com", "p_log_type": "spoofed"}));
        raw.row_id = Some("row-1".to_string());
        let result = normalizer.normalize(raw.at(at), at);

        let json: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "p_log_type": "Test.Event",
                "p_event_time": "2020-05-01T12:00:00.000000000Z",
                "p_parse_time": "2020-05-01T12:00:00.000000000Z",
                "p_row_id": "row-1",
                "p_source_id": "src-1",
                "p_source_label": "prod",
                "p_any_domain_names": ["example.com"],
                "host": "example.com",
            })
        );
    }

    #[test]
    fn test_field_set_from_schema_and_json() {
        let from_schema = FieldSet::from_schema(&schema());
        let expected: FieldSet = [FieldId::IpAddress, FieldId::DomainName, FieldId::Username]
            .into_iter()
            .collect();
        assert_eq!(from_schema, expected);

        let doc = json!({"p_any_usernames": ["a"], "p_any_ip_addresses": ["1.1.1.1"], "other": 1});
        let from_json = FieldSet::from_json(&doc);
        assert_eq!(from_json.len(), 2);
        assert!(from_json.contains(FieldId::Username));
        assert!(!from_json.contains(FieldId::DomainName));
    }
}
