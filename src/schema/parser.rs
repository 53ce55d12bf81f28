//! Dump parser: reads back what [`super::SchemaDumper`] wrote
//!
//! Only the header and the symbolic declarations carry meaning; raw DDL blocks
//! are kept as names so callers can tell what was left unrecognised. A raw
//! block runs until the next blank line and its lines are never read as
//! entries.
//!
//! ## Supported Syntax
//!
//! ```text
//! -- trigger schema
//! -- version: 20240101120000
//!
//! create_trigger {"name":"bob_tr","table":"users",...}
//!
//! -- manual trigger: audit_tr
//! CREATE TRIGGER audit_tr AFTER DELETE ON users ...
//! ```

use crate::error::{TriggerError, TriggerResult};
use crate::trigger::TriggerDefinition;

pub(crate) const HEADER: &str = "-- trigger schema";
pub(crate) const VERSION_PREFIX: &str = "-- version:";
pub(crate) const SYMBOLIC_PREFIX: &str = "create_trigger ";
pub(crate) const MANUAL_PREFIX: &str = "-- manual trigger:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDump {
    pub version: Option<u64>,
    /// Symbolic declarations, in dump order
    pub triggers: Vec<TriggerDefinition>,
    /// Names of raw DDL entries
    pub manual: Vec<String>,
}

pub fn parse_dump(text: &str) -> TriggerResult<ParsedDump> {
    let mut parsed = ParsedDump::default();
    let mut in_raw_block = false;

    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            in_raw_block = false;
        } else if in_raw_block {
            continue;
        } else if let Some(version) = line.strip_prefix(VERSION_PREFIX) {
            let version = version.trim();
            let version = version.parse().map_err(|e| TriggerError::Serialization {
                message: format!("line {}: invalid dump version '{version}': {e}", index + 1),
            })?;
            parsed.version = Some(version);
        } else if let Some(json) = line.strip_prefix(SYMBOLIC_PREFIX) {
            let trigger: TriggerDefinition =
                serde_json::from_str(json).map_err(|e| TriggerError::Serialization {
                    message: format!("line {}: invalid trigger declaration: {e}", index + 1),
                })?;
            parsed.triggers.push(trigger);
        } else if let Some(name) = line.strip_prefix(MANUAL_PREFIX) {
            parsed.manual.push(name.trim().to_string());
            in_raw_block = true;
        }
    }

    Ok(parsed)
}
