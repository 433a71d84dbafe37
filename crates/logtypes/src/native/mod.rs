//! Log types compiled into the binary.
//!
//! - `gravitational`: Teleport audit events (JSON)
//! - `syslog`: RFC 5424 and RFC 3164 messages
//! - `apache`: HTTP server access logs
//!
//! `json` holds the generic builder for JSON-per-line formats.

pub mod apache;
pub mod gravitational;
pub mod json;
pub mod syslog;

use crate::error::RegistryError;
use crate::group::{Group, LogTypes};
use crate::registry::Registry;

/// Every native group, in registration order.
pub fn native_groups() -> Result<Vec<Group>, RegistryError> {
    Ok(vec![
        gravitational::log_types()?,
        syslog::log_types()?,
        apache::log_types()?,
    ])
}

/// A registry whose native partition holds every native group.
pub fn registry() -> Result<Registry, RegistryError> {
    let groups = native_groups()?;
    let refs: Vec<&dyn LogTypes> = groups.iter().map(|g| g as &dyn LogTypes).collect();
    Registry::build(&refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Finder;

    #[test]
    fn test_native_registry() {
        let reg = registry().unwrap();
        assert_eq!(
            reg.log_types(),
            vec![
                "Apache.AccessCombined",
                "Apache.AccessCommon",
                "Gravitational.TeleportAudit",
                "Syslog.RFC3164",
                "Syslog.RFC5424",
            ]
        );
        assert!(reg.find("Syslog.RFC5424").is_some());
        assert!(reg.is_native("Apache.AccessCommon"));
    }

    #[test]
    fn test_every_native_parser_accepts_default_options() {
        let reg = registry().unwrap();
        let parsers = reg.available_parsers().unwrap();
        assert_eq!(parsers.len(), reg.len());
    }
}
