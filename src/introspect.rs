//! Live database boundary
//!
//! The core never talks to a database itself. It reads the live trigger set
//! through [`Introspect`] and hands DDL to an [`Executor`].
//!
//! [`MemoryDatabase`] implements both by recognising the statements the three
//! compilers emit, which is enough to run migrations, rollbacks and dumps end
//! to end without a live engine.
//!
//! ## Limitations
//!
//! - Regex-based recognition (not a SQL parser); only the statement shapes the
//!   compilers produce are understood
//! - Trigger names are unique per database, not per table

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::error::{TriggerError, TriggerResult};

/// Trigger name → live DDL
pub type TriggerSnapshot = BTreeMap<String, String>;

pub trait Introspect {
    /// Every trigger currently present, keyed by name
    fn snapshot(&self) -> TriggerResult<TriggerSnapshot>;
}

pub trait Executor {
    fn execute(&mut self, sql: &str) -> TriggerResult<()>;
}

struct Patterns {
    create_function: Regex,
    create_trigger: Regex,
    executes: Regex,
    drop_trigger: Regex,
    drop_function: Regex,
}

static PATTERNS: OnceCell<Patterns> = OnceCell::new();

fn patterns() -> TriggerResult<&'static Patterns> {
    PATTERNS
        .get_or_try_init(|| {
            Ok::<_, regex::Error>(Patterns {
                create_function: Regex::new(
                    r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?FUNCTION\s+([\w.]+)\s*\(",
                )?,
                create_trigger: Regex::new(
                    r"(?ix)
                    ^CREATE\s+
                    (?:DEFINER\s*=\s*\S+\s+)?      # optional definer clause
                    TRIGGER\s+(\w+)\s+             # trigger name
                    (?:BEFORE|AFTER)\s",
                )?,
                executes: Regex::new(r"(?i)EXECUTE\s+(?:FUNCTION|PROCEDURE)\s+([\w.]+)\s*\(")?,
                drop_trigger: Regex::new(
                    r"(?i)^DROP\s+TRIGGER\s+IF\s+EXISTS\s+(\w+)(?:\s+ON\s+[\w.]+)?\s*;?$",
                )?,
                drop_function: Regex::new(
                    r"(?i)^DROP\s+FUNCTION\s+IF\s+EXISTS\s+([\w.]+)\s*\(\s*\)\s*;?$",
                )?,
            })
        })
        .map_err(TriggerError::from)
}

/// In-memory stand-in for a database's trigger catalog
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    functions: BTreeMap<String, String>,
    triggers: BTreeMap<String, String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers.keys().cloned().collect()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Number of live triggers whose DDL (function included) contains `needle`
    pub fn count_matching(&self, needle: &str) -> TriggerResult<usize> {
        Ok(self
            .snapshot()?
            .values()
            .filter(|ddl| ddl.contains(needle))
            .count())
    }

    fn create_trigger(&mut self, name: &str, sql: &str) -> TriggerResult<()> {
        if self.triggers.contains_key(name) {
            return Err(failure(sql, format!("trigger \"{name}\" already exists")));
        }
        if let Some(function) = executed_function(sql)? {
            if !self.functions.contains_key(&function) {
                return Err(failure(sql, format!("function {function}() does not exist")));
            }
        }
        self.triggers.insert(name.to_string(), sql.to_string());
        Ok(())
    }

    fn drop_function(&mut self, name: &str, sql: &str) -> TriggerResult<()> {
        for trigger_sql in self.triggers.values() {
            if executed_function(trigger_sql)?.as_deref() == Some(name) {
                return Err(failure(sql, format!("other objects depend on function {name}()")));
            }
        }
        self.functions.remove(name);
        Ok(())
    }
}

impl Executor for MemoryDatabase {
    fn execute(&mut self, sql: &str) -> TriggerResult<()> {
        let sql = sql.trim();
        let patterns = patterns()?;
        debug!(statement = %sql.lines().next().unwrap_or_default(), "executing");

        if let Some(caps) = patterns.create_function.captures(sql) {
            self.functions.insert(caps[1].to_string(), sql.to_string());
            Ok(())
        } else if let Some(caps) = patterns.create_trigger.captures(sql) {
            let name = caps[1].to_string();
            self.create_trigger(&name, sql)
        } else if let Some(caps) = patterns.drop_trigger.captures(sql) {
            self.triggers.remove(&caps[1]);
            Ok(())
        } else if let Some(caps) = patterns.drop_function.captures(sql) {
            let name = caps[1].to_string();
            self.drop_function(&name, sql)
        } else {
            Err(failure(sql, "unrecognised statement".to_string()))
        }
    }
}

impl Introspect for MemoryDatabase {
    /// Function-backed triggers are reported with their function definition first
    fn snapshot(&self) -> TriggerResult<TriggerSnapshot> {
        let mut snapshot = TriggerSnapshot::new();
        for (name, sql) in &self.triggers {
            let function = executed_function(sql)?.and_then(|f| self.functions.get(&f));
            let ddl = match function {
                Some(function_sql) => format!("{function_sql}\n{sql}"),
                None => sql.clone(),
            };
            snapshot.insert(name.clone(), ddl);
        }
        Ok(snapshot)
    }
}

fn executed_function(sql: &str) -> TriggerResult<Option<String>> {
    Ok(patterns()?.executes.captures(sql).map(|caps| caps[1].to_string()))
}

fn failure(sql: &str, reason: String) -> TriggerError {
    TriggerError::Execution {
        statement: sql.to_string(),
        reason,
    }
}
