//! Trigger Values: the immutable description of one logical trigger
//!
//! A [`TriggerDefinition`] is only produced by [`crate::TriggerBuilder`] (or read
//! back from a schema dump) and is never mutated afterwards. A changed trigger
//! is a new value; migrations express the change as drop-old + create-new.
//!
//! ## Canonical form
//!
//! Compiled DDL is compared by string equality everywhere, so every field is
//! stored canonically at build time:
//! - events are a set, always iterated INSERT, UPDATE, DELETE, TRUNCATE
//! - statements are trimmed and end with exactly one `;`
//! - conditions are trimmed, placeholders already resolved

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{MAX_IDENTIFIER_LENGTH, NAME_HASH_LENGTH};
use crate::error::TriggerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Before,
    After,
}

impl Timing {
    pub fn as_sql(self) -> &'static str {
        match self {
            Timing::Before => "BEFORE",
            Timing::After => "AFTER",
        }
    }

    pub(crate) fn slug(self) -> &'static str {
        match self {
            Timing::Before => "before",
            Timing::After => "after",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Timing {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Timing::Before),
            "after" => Ok(Timing::After),
            _ => Err(TriggerError::InvalidTiming {
                value: s.to_string(),
            }),
        }
    }
}

/// Row-change event; the derive order is the canonical rendering order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl Event {
    pub fn as_sql(self) -> &'static str {
        match self {
            Event::Insert => "INSERT",
            Event::Update => "UPDATE",
            Event::Delete => "DELETE",
            Event::Truncate => "TRUNCATE",
        }
    }

    pub(crate) fn slug(self) -> &'static str {
        match self {
            Event::Insert => "insert",
            Event::Update => "update",
            Event::Delete => "delete",
            Event::Truncate => "truncate",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Event {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(Event::Insert),
            "update" => Ok(Event::Update),
            "delete" => Ok(Event::Delete),
            "truncate" => Ok(Event::Truncate),
            _ => Err(TriggerError::InvalidEvent {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Row,
    Statement,
}

impl Granularity {
    pub fn as_sql(self) -> &'static str {
        match self {
            Granularity::Row => "ROW",
            Granularity::Statement => "STATEMENT",
        }
    }

    pub(crate) fn slug(self) -> &'static str {
        match self {
            Granularity::Row => "row",
            Granularity::Statement => "statement",
        }
    }
}

impl FromStr for Granularity {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row" => Ok(Granularity::Row),
            "statement" => Ok(Granularity::Statement),
            _ => Err(TriggerError::InvalidGranularity {
                value: s.to_string(),
            }),
        }
    }
}

/// Whose privileges the trigger body runs with
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    Invoker,
    Definer,
    /// Explicit account, e.g. `'app'@'localhost'`
    Principal(String),
}

impl From<&str> for Security {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "invoker" => Security::Invoker,
            "definer" => Security::Definer,
            _ => Security::Principal(s.trim().to_string()),
        }
    }
}

/// Logical identity of a trigger: what "the same trigger" means across edits
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerIdentity {
    pub table: String,
    pub name: String,
    pub timing: Timing,
    pub events: BTreeSet<Event>,
}

/// One logical trigger. Compiled DDL is a pure function of these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) timing: Timing,
    pub(crate) events: BTreeSet<Event>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) columns: Vec<String>,
    #[serde(default)]
    pub(crate) granularity: Granularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) security: Option<Security>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) declarations: Vec<String>,
    pub(crate) body: Vec<String>,
    pub(crate) compatibility: u32,
    pub(crate) generated: bool,
}

impl TriggerDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    /// `UPDATE OF` columns, empty when the trigger fires on any column
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn security(&self) -> Option<&Security> {
        self.security.as_ref()
    }

    pub fn declarations(&self) -> &[String] {
        &self.declarations
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    pub fn compatibility(&self) -> u32 {
        self.compatibility
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn reacts_to(&self, event: Event) -> bool {
        self.events.contains(&event)
    }

    pub fn identity(&self) -> TriggerIdentity {
        TriggerIdentity {
            table: self.table.clone(),
            name: self.name.clone(),
            timing: self.timing,
            events: self.events.clone(),
        }
    }

    /// (table, timing, event) slots this trigger occupies
    pub fn slots(&self) -> impl Iterator<Item = (&str, Timing, Event)> + '_ {
        self.events
            .iter()
            .map(move |event| (self.table.as_str(), self.timing, *event))
    }

    /// Same trigger, rendered under another compatibility version
    pub(crate) fn at_compatibility(&self, compatibility: u32) -> Self {
        Self {
            compatibility,
            ..self.clone()
        }
    }

    pub(crate) fn sort_key(&self) -> (&str, &str) {
        (&self.table, &self.name)
    }
}

/// Trim a statement and give it exactly one terminator.
/// Returns `None` for blank input.
pub(crate) fn canonical_statement(statement: &str) -> Option<String> {
    let lines: Vec<&str> = statement.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    let trimmed = joined.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("{trimmed};"))
    }
}

pub(crate) fn canonical_body<I, S>(statements: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    statements
        .into_iter()
        .filter_map(|s| canonical_statement(s.as_ref()))
        .collect()
}

/// Deterministic name from table, timing, events, granularity and condition
///
/// `users` / AFTER / {INSERT} / ROW / `NEW.name = 'bob'`
/// → `users_after_insert_row_<8 hex>_tr`
pub(crate) fn derived_name(
    table: &str,
    timing: Timing,
    events: &BTreeSet<Event>,
    granularity: Granularity,
    condition: Option<&str>,
) -> String {
    let events_slug = events
        .iter()
        .map(|e| e.slug())
        .collect::<Vec<_>>()
        .join("_or_");
    let mut base = format!(
        "{}_{}_{}_{}",
        table.replace('.', "_"),
        timing.slug(),
        events_slug,
        granularity.slug()
    );
    if let Some(condition) = condition {
        base.push('_');
        base.push_str(&short_hash(condition));
    }

    let name = format!("{base}_tr");
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return name;
    }

    // Keep the name unique when it has to be shortened
    let keep = MAX_IDENTIFIER_LENGTH - NAME_HASH_LENGTH - "__tr".len();
    format!("{}_{}_tr", &base[..keep], short_hash(&base))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..NAME_HASH_LENGTH].to_string()
}
