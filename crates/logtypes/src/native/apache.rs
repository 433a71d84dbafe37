//! Apache HTTP server access logs (common and combined formats).
//!
//! `host ident authuser [date] "request" status bytes ["referer" "user-agent"]`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map};

use crate::entry::{decode_options, ConfigParser, Desc, EventParser, ParserConfig, RawEvent};
use crate::error::{ConfigError, ParseError, RegistryError};
use crate::group::{build_group, Group};
use crate::result::{format_time, FieldId};
use crate::schema::{FieldKind, FieldSpec, Schema};

pub const LOG_TYPE_PREFIX: &str = "Apache";

const REQUEST_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

fn access_schema(combined: bool) -> Schema {
    let mut schema = Schema::new()
        .field(FieldSpec::new("remote_host", FieldKind::String).indicator(FieldId::IpAddress))
        .field(FieldSpec::new("identity", FieldKind::String).describe("RFC 1413 client identity"))
        .field(FieldSpec::new("user", FieldKind::String).indicator(FieldId::Username))
        .field(FieldSpec::new("request_time", FieldKind::Timestamp))
        .field(FieldSpec::new("method", FieldKind::String))
        .field(FieldSpec::new("path", FieldKind::String))
        .field(FieldSpec::new("protocol", FieldKind::String))
        .field(FieldSpec::new("status", FieldKind::Integer))
        .field(FieldSpec::new("bytes", FieldKind::Integer));
    if combined {
        schema = schema
            .field(FieldSpec::new("referer", FieldKind::String))
            .field(FieldSpec::new("user_agent", FieldKind::String));
    }
    schema.event_time("request_time")
}

fn access_log(name: &str, description: &str, combined: bool) -> ConfigParser {
    let factory = move |config: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
        decode_options::<NoOptions>(config)?;
        Ok(Box::new(AccessLogParser { combined }))
    };
    ConfigParser {
        desc: Desc::new(
            format!("{}.{}", LOG_TYPE_PREFIX, name),
            description,
            "https://httpd.apache.org/docs/current/logs.html#accesslog",
        ),
        schema: access_schema(combined),
        factory: Arc::new(factory),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct NoOptions {}

pub fn log_types() -> Result<Group, RegistryError> {
    build_group(&[
        &access_log("AccessCommon", "Apache HTTP server access logs using the common format", false),
        &access_log("AccessCombined", "Apache HTTP server access logs using the combined format", true),
    ])
}

struct AccessLogParser {
    combined: bool,
}

impl EventParser for AccessLogParser {
    fn parse_events(&mut self, line: &str) -> Result<Vec<RawEvent>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let mut cursor = Cursor { rest: line };

        let remote_host = cursor.token()?;
        let identity = cursor.token()?;
        let user = cursor.token()?;
        let request_time = cursor.bracketed()?;
        let request = cursor.quoted()?;
        let status = cursor.token()?;
        let bytes = cursor.token()?;

        let event_time = DateTime::parse_from_str(request_time, REQUEST_TIME_FORMAT)
            .map_err(|_| ParseError::InvalidTimestamp {
                field: "request_time".into(),
                value: request_time.into(),
            })?
            .with_timezone(&Utc);

        let status: u16 = status
            .parse()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid status {:?}", status)))?;

        let mut fields = Map::new();
        insert_token(&mut fields, "remote_host", remote_host);
        insert_token(&mut fields, "identity", identity);
        insert_token(&mut fields, "user", user);
        fields.insert("request_time".into(), json!(format_time(&event_time)));

        // "METHOD /path PROTOCOL"; malformed requests keep the raw line as path
        let mut parts = request.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(path), protocol) => {
                insert_token(&mut fields, "method", method);
                insert_token(&mut fields, "path", path);
                insert_token(&mut fields, "protocol", protocol.unwrap_or_default());
            }
            _ => insert_token(&mut fields, "path", &request),
        }

        fields.insert("status".into(), json!(status));
        // "-" means no body was sent
        if bytes != "-" {
            let size: u64 = bytes
                .parse()
                .map_err(|_| ParseError::InvalidFormat(format!("Invalid response size {:?}", bytes)))?;
            fields.insert("bytes".into(), json!(size));
        }

        if self.combined {
            let referer = cursor.quoted()?;
            let user_agent = cursor.quoted()?;
            insert_token(&mut fields, "referer", &referer);
            insert_token(&mut fields, "user_agent", &user_agent);
        }

        Ok(vec![RawEvent::new(fields).at(event_time)])
    }
}

fn insert_token(fields: &mut Map<String, serde_json::Value>, key: &str, token: &str) {
    if token != "-" && !token.is_empty() {
        fields.insert(key.into(), json!(token));
    }
}

/// Left-to-right field reader over one access log line.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn truncated() -> ParseError {
        ParseError::InvalidFormat("Truncated access log line".into())
    }

    fn token(&mut self) -> Result<&'a str, ParseError> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return Err(Self::truncated());
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        self.rest = &rest[end..];
        Ok(&rest[..end])
    }

    fn bracketed(&mut self) -> Result<&'a str, ParseError> {
        let rest = self
            .rest
            .trim_start()
            .strip_prefix('[')
            .ok_or_else(|| ParseError::InvalidFormat("Missing timestamp bracket".into()))?;
        let end = rest
            .find(']')
            .ok_or_else(|| ParseError::InvalidFormat("Unterminated timestamp bracket".into()))?;
        self.rest = &rest[end + 1..];
        Ok(&rest[..end])
    }

    /// Read a double quoted string, resolving backslash escapes.
    fn quoted(&mut self) -> Result<String, ParseError> {
        let rest = self
            .rest
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(Self::truncated)?;
        let mut val = String::new();
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            if escaped {
                val.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                self.rest = &rest[i + 1..];
                return Ok(val);
            } else {
                val.push(c);
            }
        }
        Err(ParseError::InvalidFormat("Unterminated quoted field".into()))
    }
}
