//! Decode — turns notification bodies into work units.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;

/// One batch of raw lines of a single log type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkUnit {
    pub log_type: String,
    pub source_id: String,
    pub source_label: String,
    pub lines: Vec<String>,
}

pub trait Decoder: Send + Sync {
    /// Decode a whole batch. Any invalid body fails the batch.
    fn decode(&self, bodies: &[String]) -> Result<Vec<WorkUnit>, DecodeError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    log_type: Option<String>,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    source_label: String,
    lines: Option<Vec<String>>,
    data: Option<String>,
}

/// Decodes JSON envelopes, optionally wrapped in an SNS-style notification:
///
/// ```json
/// {"logType": "Syslog.RFC5424", "sourceId": "s1", "lines": ["<34>1 ..."]}
/// {"logType": "Syslog.RFC5424", "data": "<34>1 ...\n<34>1 ..."}
/// {"Type": "Notification", "Message": "{\"logType\": ...}"}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeDecoder;

impl EnvelopeDecoder {
    fn decode_one(&self, body: &str) -> Result<WorkUnit, DecodeError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| DecodeError::InvalidBody(e.to_string()))?;
        let value = unwrap_notification(value)?;
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| DecodeError::InvalidBody(e.to_string()))?;

        let log_type = envelope
            .log_type
            .filter(|t| !t.is_empty())
            .ok_or(DecodeError::MissingField("logType"))?;
        let lines = match (envelope.lines, envelope.data) {
            (Some(lines), None) => lines,
            (None, Some(data)) => data.lines().map(str::to_string).collect(),
            (Some(_), Some(_)) => {
                return Err(DecodeError::InvalidBody("both lines and data are set".into()))
            }
            (None, None) => return Err(DecodeError::MissingField("lines")),
        };

        Ok(WorkUnit {
            log_type,
            source_id: envelope.source_id,
            source_label: envelope.source_label,
            lines,
        })
    }
}

fn unwrap_notification(value: Value) -> Result<Value, DecodeError> {
    if value.get("Type").and_then(Value::as_str) != Some("Notification") {
        return Ok(value);
    }
    let message = value
        .get("Message")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("Message"))?;
    serde_json::from_str(message).map_err(|e| DecodeError::InvalidBody(e.to_string()))
}

impl Decoder for EnvelopeDecoder {
    fn decode(&self, bodies: &[String]) -> Result<Vec<WorkUnit>, DecodeError> {
        bodies.iter().map(|body| self.decode_one(body)).collect()
    }
}
