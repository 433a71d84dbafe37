//! Schema — explicit field descriptors for a log type.
//!
//! A schema lists the fields a parser emits, which of them carry
//! indicator values, and where the event time lives.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::result::FieldId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Timestamp,
    Integer,
    Float,
    Bool,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Dotted path into the event object (`addr.remote`)
    pub name: String,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator: Option<FieldId>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            indicator: None,
            description: String::new(),
        }
    }

    pub fn indicator(mut self, id: FieldId) -> Self {
        self.indicator = Some(id);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_time: Option<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Mark `path` as the field holding the event time.
    pub fn event_time(mut self, path: impl Into<String>) -> Self {
        self.event_time = Some(path.into());
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn event_time_field(&self) -> Option<&str> {
        self.event_time.as_deref()
    }

    /// Fields tagged with an indicator kind, in declaration order.
    pub fn indicator_fields(&self) -> impl Iterator<Item = (&str, FieldId)> {
        self.fields
            .iter()
            .filter_map(|f| f.indicator.map(|id| (f.name.as_str(), id)))
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() {
                return Err("schema field with empty name".to_string());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate schema field {:?}", field.name));
            }
        }

        if let Some(path) = &self.event_time {
            match self.fields.iter().find(|f| &f.name == path) {
                Some(f) if f.kind == FieldKind::Timestamp => {}
                Some(f) => {
                    return Err(format!(
                        "event time field {:?} has kind {:?}, expected timestamp",
                        path, f.kind
                    ))
                }
                None => return Err(format!("event time field {:?} is not declared", path)),
            }
        }
        Ok(())
    }
}

/// Resolve a dotted path inside a JSON object.
///
/// A literal key equal to the whole path wins over nested lookup.
pub fn lookup<'a>(obj: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = obj.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = obj.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Schema {
        Schema::new()
            .field(FieldSpec::new("time", FieldKind::Timestamp))
            .field(FieldSpec::new("addr.remote", FieldKind::String).indicator(FieldId::IpAddress))
            .field(FieldSpec::new("user", FieldKind::String).indicator(FieldId::Username))
            .field(FieldSpec::new("event", FieldKind::String))
            .event_time("time")
    }

    #[test]
    fn test_validate_accepts_well_formed_schema() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_field() {
        let schema = sample().field(FieldSpec::new("user", FieldKind::String));
        let err = schema.validate().unwrap_err();
        assert!(err.contains("duplicate"), "unexpected error: {}", err);
    }

    #[test]
    fn test_validate_rejects_non_timestamp_event_time() {
        let schema = Schema::new()
            .field(FieldSpec::new("event", FieldKind::String))
            .event_time("event");
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_undeclared_event_time() {
        let schema = Schema::new().event_time("missing");
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_indicator_fields_in_declaration_order() {
        let schema = sample();
        let fields: Vec<_> = schema.indicator_fields().collect();
        assert_eq!(
            fields,
            vec![("addr.remote", FieldId::IpAddress), ("user", FieldId::Username)]
        );
    }

    #[test]
    fn test_lookup_nested_path() {
        let value = json!({"addr": {"remote": "10.0.0.1:3022"}, "user": "alice"});
        let obj = value.as_object().unwrap();
        assert_eq!(lookup(obj, "addr.remote"), Some(&json!("10.0.0.1:3022")));
        assert_eq!(lookup(obj, "user"), Some(&json!("alice")));
        assert_eq!(lookup(obj, "addr.local"), None);
        assert_eq!(lookup(obj, "user.name"), None);
    }

    #[test]
    fn test_lookup_prefers_literal_dotted_key() {
        let value = json!({"addr.remote": "flat", "addr": {"remote": "nested"}});
        let obj = value.as_object().unwrap();
        assert_eq!(lookup(obj, "addr.remote"), Some(&json!("flat")));
    }
}
