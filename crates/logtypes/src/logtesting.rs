//! Parser conformance helpers for tests.
//!
//! Expected results are JSON documents in the serialized result shape.
//! `{{LogType}}` inside an expected document is replaced with the log type
//! under test. Volatile core fields may be left out of the expectation:
//!
//! - no `p_row_id`: the actual row id must be non-empty
//! - no `p_event_time`: the actual event time must equal the parse time
//! - no `p_parse_time`: the actual parse time must be non-zero
//!
//! Every helper panics on mismatch, like the `assert!` family.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::entry::LogParser;
use crate::group::Finder;
use crate::result::{
    format_time, FieldSet, NormalizedResult, FIELD_EVENT_TIME, FIELD_LOG_TYPE, FIELD_PARSE_TIME,
    FIELD_ROW_ID,
};

const LOG_TYPE_PLACEHOLDER: &str = "{{LogType}}";

/// One conformance case, as read from a `[[case]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub name: String,
    pub log_type: String,
    pub input: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub results: Vec<String>,
}

impl TestCase {
    pub fn expected(&self) -> Vec<&str> {
        self.result
            .iter()
            .chain(self.results.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn run(&self, finder: &dyn Finder) {
        test_log_type(finder, &self.log_type, &self.input, &self.expected());
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseFile {
    #[serde(default)]
    case: Vec<TestCase>,
}

/// Parse `input` with a default parser for `log_type` and check the results.
///
/// An empty `expected` slice asserts that the line is filtered.
pub fn test_log_type(finder: &dyn Finder, log_type: &str, input: &str, expected: &[&str]) {
    let entry = finder
        .find(log_type)
        .unwrap_or_else(|| panic!("log type {:?} not found", log_type));
    let mut parser = entry
        .new_parser(None)
        .unwrap_or_else(|e| panic!("failed to create {} parser: {}", log_type, e));
    let results = parser
        .parse_log(input)
        .unwrap_or_else(|e| panic!("{} failed to parse {:?}: {}", log_type, input, e));

    assert_eq!(
        expected.len(),
        results.len(),
        "invalid number of results produced by {}",
        log_type
    );
    for (expect, actual) in expected.iter().zip(&results) {
        let expect = expect.replace(LOG_TYPE_PLACEHOLDER, log_type);
        test_result(&expect, actual, Some(entry.indicators()));
    }
}

/// Like [`test_log_type`] for an already constructed parser.
pub fn test_parser(parser: &mut LogParser, input: &str, expected: &[&str]) {
    let results = parser
        .parse_log(input)
        .unwrap_or_else(|e| panic!("failed to parse {:?}: {}", input, e));
    assert_eq!(expected.len(), results.len(), "invalid number of results");
    for (expect, actual) in expected.iter().zip(&results) {
        test_result(expect, actual, None);
    }
}

/// Check one result against its expected JSON document.
///
/// Indicator kinds default to the `p_any_*` keys of the expectation.
pub fn test_result(expected: &str, actual: &NormalizedResult, indicators: Option<&FieldSet>) {
    let mut expect: Value = serde_json::from_str(expected)
        .unwrap_or_else(|e| panic!("invalid expected JSON: {}\n{}", e, expected));
    let Some(expect_obj) = expect.as_object_mut() else {
        panic!("expected result must be a JSON object: {}", expected);
    };

    assert_eq!(
        expect_obj.get(FIELD_LOG_TYPE).and_then(Value::as_str),
        Some(actual.core.log_type.as_str()),
        "invalid log type"
    );

    let derived;
    let indicators = match indicators {
        Some(set) => set,
        None => {
            derived = FieldSet::from_json(&Value::Object(expect_obj.clone()));
            &derived
        }
    };
    for id in indicators.iter() {
        let expect_values: BTreeSet<String> = expect_obj
            .get(id.json_name())
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let actual_values = actual.values(id).cloned().unwrap_or_default();
        assert_eq!(expect_values, actual_values, "invalid {} values", id.json_name());
        // Order inside the expectation is not significant
        if !expect_values.is_empty() {
            expect_obj.insert(id.json_name().into(), serde_json::json!(expect_values));
        }
    }

    match expected_time(expect_obj.get(FIELD_PARSE_TIME)) {
        None => assert_ne!(actual.core.parse_time.timestamp_nanos_opt(), Some(0), "zero parse time"),
        Some(t) => assert_eq!(format_time(&t), format_time(&actual.core.parse_time), "invalid parse time"),
    }
    match expected_time(expect_obj.get(FIELD_EVENT_TIME)) {
        None => assert_eq!(
            actual.core.parse_time, actual.core.event_time,
            "event time not equal to parse time"
        ),
        Some(t) => assert_eq!(format_time(&t), format_time(&actual.core.event_time), "invalid event time"),
    }
    match expect_obj.get(FIELD_ROW_ID).and_then(Value::as_str) {
        None | Some("") => assert!(!actual.core.row_id.is_empty(), "empty row id"),
        Some(id) => assert_eq!(id, actual.core.row_id, "invalid row id"),
    }

    // The serialized document must agree with the in-memory result
    let actual_json: Value = serde_json::to_value(actual).unwrap_or_else(|e| panic!("failed to serialize result: {}", e));
    assert_eq!(
        actual_json[FIELD_EVENT_TIME],
        Value::String(format_time(&actual.core.event_time)),
        "invalid JSON event time"
    );
    assert_eq!(
        actual_json[FIELD_PARSE_TIME],
        Value::String(format_time(&actual.core.parse_time)),
        "invalid JSON parse time"
    );
    assert_eq!(actual_json[FIELD_ROW_ID], Value::String(actual.core.row_id.clone()), "invalid JSON row id");

    // Volatile fields are verified; copy them over to compare the rest
    for key in [FIELD_EVENT_TIME, FIELD_PARSE_TIME, FIELD_ROW_ID] {
        expect_obj.insert(key.into(), actual_json[key].clone());
    }
    assert_eq!(expect, actual_json, "result JSON mismatch");
}

fn expected_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = value?.as_str().filter(|s| !s.is_empty())?;
    let t = DateTime::parse_from_rfc3339(s)
        .unwrap_or_else(|e| panic!("invalid expected timestamp {:?}: {}", s, e));
    Some(t.with_timezone(&Utc))
}

/// Run every `[[case]]` of a TOML document. All cases run; failures are
/// reported together.
pub fn run_tests_from_str(finder: &dyn Finder, document: &str) {
    let file: CaseFile = toml::from_str(document).unwrap_or_else(|e| panic!("invalid test cases: {}", e));
    assert!(!file.case.is_empty(), "no test cases found");

    let failed: Vec<&str> = file
        .case
        .iter()
        .filter(|case| panic::catch_unwind(AssertUnwindSafe(|| case.run(finder))).is_err())
        .map(|case| case.name.as_str())
        .collect();
    assert!(failed.is_empty(), "failed cases: {:?}", failed);
}

pub fn run_tests_from_toml(finder: &dyn Finder, path: impl AsRef<Path>) {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    run_tests_from_str(finder, &document);
}
