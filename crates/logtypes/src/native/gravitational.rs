//! Gravitational Teleport audit events.

use crate::entry::Desc;
use crate::error::RegistryError;
use crate::group::{build_group, Group};
use crate::native::json::ConfigJson;
use crate::result::FieldId;
use crate::schema::{FieldKind, FieldSpec, Schema};

pub const LOG_TYPE_PREFIX: &str = "Gravitational";

fn teleport_audit() -> ConfigJson {
    let schema = Schema::new()
        .field(FieldSpec::new("event", FieldKind::String).describe("Event type"))
        .field(FieldSpec::new("code", FieldKind::String).describe("Event code"))
        .field(FieldSpec::new("time", FieldKind::Timestamp))
        .field(FieldSpec::new("uid", FieldKind::String).describe("Unique event id"))
        .field(FieldSpec::new("user", FieldKind::String).indicator(FieldId::Username))
        .field(FieldSpec::new("login", FieldKind::String).indicator(FieldId::Username))
        .field(FieldSpec::new("namespace", FieldKind::String))
        .field(FieldSpec::new("server_id", FieldKind::String))
        .field(FieldSpec::new("sid", FieldKind::String).describe("Session id"))
        .field(FieldSpec::new("addr.local", FieldKind::String).indicator(FieldId::IpAddress))
        .field(FieldSpec::new("addr.remote", FieldKind::String).indicator(FieldId::IpAddress))
        .field(FieldSpec::new("success", FieldKind::Bool))
        .event_time("time");

    ConfigJson::new(
        Desc::new(
            format!("{}.TeleportAudit", LOG_TYPE_PREFIX),
            "Teleport logs events like successful user logins along with the metadata \
             like remote IP address, time and the session ID.",
            "https://gravitational.com/teleport/docs/admin-guide/#audit-log",
        ),
        schema,
    )
}

pub fn log_types() -> Result<Group, RegistryError> {
    build_group(&[&teleport_audit()])
}
