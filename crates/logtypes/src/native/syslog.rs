//! Syslog messages (RFC 5424 and RFC 3164).

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::entry::{decode_options, ConfigParser, Desc, EventParser, ParserConfig, RawEvent};
use crate::error::{ConfigError, ParseError, RegistryError};
use crate::group::{build_group, Group};
use crate::result::{format_time, FieldId};
use crate::schema::{FieldKind, FieldSpec, Schema};

pub const LOG_TYPE_PREFIX: &str = "Syslog";

/// Highest valid PRI value (facility 23, severity 7)
const MAX_PRIORITY: u8 = 191;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SyslogOptions {
    /// Keep the raw structured data block of RFC 5424 messages
    keep_structured_data: Option<bool>,
}

fn common_fields(schema: Schema) -> Schema {
    schema
        .field(FieldSpec::new("priority", FieldKind::Integer))
        .field(FieldSpec::new("facility", FieldKind::Integer))
        .field(FieldSpec::new("severity", FieldKind::Integer))
        .field(FieldSpec::new("hostname", FieldKind::String).indicator(FieldId::DomainName))
        .field(FieldSpec::new("appname", FieldKind::String))
        .field(FieldSpec::new("procid", FieldKind::String))
        .field(FieldSpec::new("message", FieldKind::String))
}

fn rfc5424() -> ConfigParser {
    let schema = common_fields(Schema::new())
        .field(FieldSpec::new("version", FieldKind::Integer))
        .field(FieldSpec::new("timestamp", FieldKind::Timestamp))
        .field(FieldSpec::new("msgid", FieldKind::String))
        .field(FieldSpec::new("structured_data", FieldKind::String))
        .event_time("timestamp");
    let factory = |config: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
        let options: SyslogOptions = decode_options(config)?;
        Ok(Box::new(Rfc5424Parser {
            keep_structured_data: options.keep_structured_data.unwrap_or(true),
        }))
    };
    ConfigParser {
        desc: Desc::new(
            format!("{}.RFC5424", LOG_TYPE_PREFIX),
            "Syslog parser for the RFC-5424 format",
            "https://tools.ietf.org/html/rfc5424",
        ),
        schema,
        factory: Arc::new(factory),
    }
}

fn rfc3164() -> ConfigParser {
    let schema = common_fields(Schema::new())
        .field(FieldSpec::new("timestamp", FieldKind::String).describe("Timestamp without year or zone"));
    let factory = |config: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
        let options: SyslogOptions = decode_options(config)?;
        if options.keep_structured_data.is_some() {
            return Err(ConfigError::InvalidOptions(
                "RFC 3164 messages carry no structured data".into(),
            ));
        }
        Ok(Box::new(Rfc3164Parser))
    };
    ConfigParser {
        desc: Desc::new(
            format!("{}.RFC3164", LOG_TYPE_PREFIX),
            "Syslog parser for the RFC-3164 format (ie. BSD-syslog messages)",
            "https://tools.ietf.org/html/rfc3164",
        ),
        schema,
        factory: Arc::new(factory),
    }
}

pub fn log_types() -> Result<Group, RegistryError> {
    build_group(&[&rfc5424(), &rfc3164()])
}

/// Split `<PRI>` from the start of a line.
fn parse_priority(text: &str) -> Result<(u8, &str), ParseError> {
    let rest = text
        .strip_prefix('<')
        .ok_or_else(|| ParseError::InvalidFormat("Missing syslog priority".into()))?;
    let end = rest
        .find('>')
        .filter(|&i| (1..=3).contains(&i))
        .ok_or_else(|| ParseError::InvalidFormat("Unterminated priority".into()))?;
    let pri: u8 = rest[..end]
        .parse()
        .ok()
        .filter(|&p| p <= MAX_PRIORITY)
        .ok_or_else(|| ParseError::InvalidFormat("Invalid priority value".into()))?;
    Ok((pri, &rest[end + 1..]))
}

fn insert_priority(fields: &mut Map<String, Value>, pri: u8) {
    fields.insert("priority".into(), json!(pri));
    fields.insert("facility".into(), json!(pri >> 3));
    fields.insert("severity".into(), json!(pri & 0x07));
}

/// `-` is the RFC 5424 nil value.
fn insert_token(fields: &mut Map<String, Value>, key: &str, token: &str) {
    if token != "-" && !token.is_empty() {
        fields.insert(key.into(), json!(token));
    }
}

struct Rfc5424Parser {
    keep_structured_data: bool,
}

impl EventParser for Rfc5424Parser {
    fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let (pri, rest) = parse_priority(line)?;
        let rest = rest
            .strip_prefix("1 ")
            .ok_or_else(|| ParseError::InvalidFormat("Unsupported syslog version".into()))?;

        // TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD [MSG]
        let mut header = rest.splitn(6, ' ');
        let mut next = || {
            header
                .next()
                .ok_or_else(|| ParseError::InvalidFormat("Truncated syslog header".into()))
        };
        let timestamp = next()?;
        let hostname = next()?;
        let appname = next()?;
        let procid = next()?;
        let msgid = next()?;
        let tail = next()?;

        let event_time = if timestamp == "-" {
            None
        } else {
            let t = DateTime::parse_from_rfc3339(timestamp).map_err(|_| ParseError::InvalidTimestamp {
                field: "timestamp".into(),
                value: timestamp.into(),
            })?;
            Some(t.with_timezone(&Utc))
        };

        let (structured_data, message) = split_structured_data(tail)?;

        let mut fields = Map::new();
        insert_priority(&mut fields, pri);
        fields.insert("version".into(), json!(1));
        if let Some(t) = &event_time {
            fields.insert("timestamp".into(), json!(format_time(t)));
        }
        insert_token(&mut fields, "hostname", hostname);
        insert_token(&mut fields, "appname", appname);
        insert_token(&mut fields, "procid", procid);
        insert_token(&mut fields, "msgid", msgid);
        if self.keep_structured_data {
            insert_token(&mut fields, "structured_data", structured_data);
        }
        // A UTF-8 BOM may precede the message
        insert_token(&mut fields, "message", message.trim_start_matches('\u{feff}'));

        Ok(vec![RawEvent {
            fields,
            event_time,
            row_id: None,
        }])
    }
}

/// Split the structured data element(s) from the free-form message.
///
/// SD is either `-` or a run of `[...]` elements whose quoted values may
/// contain escaped `\]`.
fn split_structured_data(text: &str) -> Result<(&str, &str), ParseError> {
    if let Some(msg) = text.strip_prefix('-') {
        return Ok(("-", msg.strip_prefix(' ').unwrap_or(msg)));
    }
    if !text.starts_with('[') {
        return Err(ParseError::InvalidFormat("Invalid structured data".into()));
    }

    let mut in_element = false;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' if in_element => in_quotes = !in_quotes,
            '[' if !in_element => in_element = true,
            ']' if in_element && !in_quotes => in_element = false,
            _ if !in_element => {
                if c != ' ' {
                    return Err(ParseError::InvalidFormat("Invalid structured data".into()));
                }
                let msg = &text[i + 1..];
                return Ok((&text[..i], msg));
            }
            _ => {}
        }
    }
    if in_element {
        return Err(ParseError::InvalidFormat("Unterminated structured data".into()));
    }
    Ok((text, ""))
}

struct Rfc3164Parser;

impl EventParser for Rfc3164Parser {
    fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let (pri, rest) = parse_priority(line)?;

        // "Mmm dd hh:mm:ss" is always 15 characters, days are space padded
        let timestamp = rest
            .get(..15)
            .filter(|ts| is_bsd_timestamp(ts))
            .ok_or_else(|| ParseError::InvalidTimestamp {
                field: "timestamp".into(),
                value: rest.chars().take(15).collect(),
            })?;
        let rest = rest[15..].trim_start();

        let (hostname, rest) = rest.split_once(' ').unwrap_or((rest, ""));

        let mut fields = Map::new();
        insert_priority(&mut fields, pri);
        fields.insert("timestamp".into(), json!(timestamp));
        insert_token(&mut fields, "hostname", hostname);

        // TAG is alphanumeric, optionally followed by [pid], and ends with ':'
        match rest.split_once(": ") {
            Some((tag, message)) if !tag.contains(' ') && !tag.is_empty() => {
                let (appname, procid) = match tag.split_once('[') {
                    Some((app, pid)) => (app, pid.trim_end_matches(']')),
                    None => (tag, ""),
                };
                insert_token(&mut fields, "appname", appname);
                insert_token(&mut fields, "procid", procid);
                insert_token(&mut fields, "message", message);
            }
            _ => insert_token(&mut fields, "message", rest),
        }

        Ok(vec![RawEvent::new(fields)])
    }
}

fn is_bsd_timestamp(ts: &str) -> bool {
    if !ts.is_ascii() {
        return false;
    }
    let bytes = ts.as_bytes();
    MONTHS.contains(&&ts[..3])
        && bytes[3] == b' '
        && bytes[6] == b' '
        && ts[4..6].trim_start().parse::<u8>().map_or(false, |d| (1..=31).contains(&d))
        && NaiveTime::parse_from_str(&ts[7..], "%H:%M:%S").is_ok()
}
