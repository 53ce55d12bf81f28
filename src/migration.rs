//! Migrations: ordered, reversible trigger changes
//!
//! A [`Migration`] carries the operations it performs and the DDL for both
//! directions. `down` mirrors `up` exactly: operations are inverted and
//! replayed in reverse order, so applying then rolling back leaves the trigger
//! set as it was.
//!
//! [`MigrationHistory`] is the record of applied migrations. Replaying its
//! operations yields the applied trigger set the diff engine compares against.

use std::collections::BTreeMap;

use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MAX_MIGRATION_NAME_LENGTH;
use crate::ddl::Engine;
use crate::diff::TriggerDiff;
use crate::error::{TriggerError, TriggerResult};
use crate::introspect::Executor;
use crate::trigger::TriggerDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "trigger", rename_all = "snake_case")]
pub enum TriggerOperation {
    Create(TriggerDefinition),
    Drop(TriggerDefinition),
}

impl TriggerOperation {
    pub fn trigger(&self) -> &TriggerDefinition {
        match self {
            TriggerOperation::Create(t) | TriggerOperation::Drop(t) => t,
        }
    }

    pub fn inverse(&self) -> Self {
        match self {
            TriggerOperation::Create(t) => TriggerOperation::Drop(t.clone()),
            TriggerOperation::Drop(t) => TriggerOperation::Create(t.clone()),
        }
    }

    /// DDL for this operation. Support was checked when the migration was generated.
    pub fn statements(&self, engine: Engine) -> Vec<String> {
        match self {
            TriggerOperation::Create(t) => engine.compiler().render_create(t),
            TriggerOperation::Drop(t) => engine.compile_drop(t),
        }
    }
}

fn up_statements(engine: Engine, operations: &[TriggerOperation]) -> Vec<String> {
    operations.iter().flat_map(|op| op.statements(engine)).collect()
}

fn down_statements(engine: Engine, operations: &[TriggerOperation]) -> Vec<String> {
    operations
        .iter()
        .rev()
        .flat_map(|op| op.inverse().statements(engine))
        .collect()
}

/// Output of migration generation, not yet versioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub name: String,
    pub engine: Engine,
    pub diff: TriggerDiff,
    pub operations: Vec<TriggerOperation>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl MigrationPlan {
    /// Drops of `diff.removed` first, then creates of `diff.added`
    pub(crate) fn from_diff(engine: Engine, diff: TriggerDiff) -> Self {
        let operations: Vec<_> = diff
            .removed
            .iter()
            .cloned()
            .map(TriggerOperation::Drop)
            .chain(diff.added.iter().cloned().map(TriggerOperation::Create))
            .collect();

        Self {
            name: suggest_name(&diff),
            engine,
            up: up_statements(engine, &operations),
            down: down_statements(engine, &operations),
            diff,
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_migration(self, version: u64) -> Migration {
        Migration {
            version,
            name: self.name,
            engine: self.engine,
            operations: self.operations,
            up: self.up,
            down: self.down,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub engine: Engine,
    #[serde(default)]
    pub operations: Vec<TriggerOperation>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl Migration {
    pub fn from_operations(
        version: u64,
        name: impl Into<String>,
        engine: Engine,
        operations: Vec<TriggerOperation>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            engine,
            up: up_statements(engine, &operations),
            down: down_statements(engine, &operations),
            operations,
        }
    }

    /// Hand-written migration; its triggers stay outside the generated set
    pub fn manual(
        version: u64,
        name: impl Into<String>,
        engine: Engine,
        up: Vec<String>,
        down: Vec<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            engine,
            operations: Vec::new(),
            up,
            down,
        }
    }
}

/// `update_trigger_x`, `create_triggers_a_and_b_and_drop_trigger_c`, ...
pub fn suggest_name(diff: &TriggerDiff) -> String {
    let replaced: Vec<&str> = diff.replaced().into_iter().map(|(old, _)| old.name()).collect();
    let created: Vec<&str> = diff
        .added
        .iter()
        .map(TriggerDefinition::name)
        .filter(|name| !replaced.contains(name))
        .collect();
    let dropped: Vec<&str> = diff
        .removed
        .iter()
        .map(TriggerDefinition::name)
        .filter(|name| !replaced.contains(name))
        .collect();

    let parts: Vec<String> = [("update", replaced), ("create", created), ("drop", dropped)]
        .into_iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(verb, names)| {
            let noun = if names.len() == 1 { "trigger" } else { "triggers" };
            format!("{verb}_{noun}_{}", names.join("_and_"))
        })
        .collect();

    if parts.is_empty() {
        return "noop".to_string();
    }
    let mut name = parts.join("_and_");
    name.truncate(MAX_MIGRATION_NAME_LENGTH);
    name.trim_end_matches('_').to_string()
}

/// Applied migrations, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationHistory {
    migrations: Vec<Migration>,
}

impl MigrationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.migrations.last().map(|m| m.version)
    }

    /// Current UTC timestamp as `YYYYMMDDHHMMSS`, bumped past the latest version
    pub fn next_version(&self) -> u64 {
        let now = Utc::now();
        let stamp = u64::from(now.year().unsigned_abs()) * 10_000_000_000
            + u64::from(now.month()) * 100_000_000
            + u64::from(now.day()) * 1_000_000
            + u64::from(now.hour()) * 10_000
            + u64::from(now.minute()) * 100
            + u64::from(now.second());
        match self.latest_version() {
            Some(latest) if latest >= stamp => latest + 1,
            _ => stamp,
        }
    }

    /// Record a migration that was applied elsewhere
    pub fn record(&mut self, migration: Migration) -> TriggerResult<()> {
        self.check_order(migration.version)?;
        self.migrations.push(migration);
        Ok(())
    }

    /// Execute `up` and record the migration
    pub fn apply(
        &mut self,
        migration: Migration,
        executor: &mut dyn Executor,
    ) -> TriggerResult<()> {
        self.check_order(migration.version)?;
        for statement in &migration.up {
            executor.execute(statement)?;
        }
        info!(
            version = migration.version,
            name = %migration.name,
            statements = migration.up.len(),
            "applied trigger migration"
        );
        self.migrations.push(migration);
        Ok(())
    }

    /// Execute the latest migration's `down` and forget it.
    /// Returns `None` when nothing has been applied.
    pub fn rollback(&mut self, executor: &mut dyn Executor) -> TriggerResult<Option<Migration>> {
        let Some(latest) = self.migrations.last() else {
            return Ok(None);
        };
        for statement in &latest.down {
            executor.execute(statement)?;
        }
        info!(version = latest.version, name = %latest.name, "rolled back trigger migration");
        Ok(self.migrations.pop())
    }

    /// Trigger set produced by replaying every recorded operation, sorted by (table, name)
    pub fn applied_triggers(&self) -> Vec<TriggerDefinition> {
        let mut applied: BTreeMap<(String, String), TriggerDefinition> = BTreeMap::new();
        for operation in self.migrations.iter().flat_map(|m| &m.operations) {
            let trigger = operation.trigger();
            let key = (trigger.table().to_string(), trigger.name().to_string());
            match operation {
                TriggerOperation::Create(t) => {
                    applied.insert(key, t.clone());
                }
                TriggerOperation::Drop(_) => {
                    applied.remove(&key);
                }
            }
        }
        applied.into_values().collect()
    }

    /// Every trigger any recorded migration created, newest first
    pub fn recorded_triggers(&self) -> Vec<TriggerDefinition> {
        self.migrations
            .iter()
            .rev()
            .flat_map(|m| m.operations.iter().rev())
            .filter_map(|op| match op {
                TriggerOperation::Create(t) => Some(t.clone()),
                TriggerOperation::Drop(_) => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> TriggerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> TriggerResult<Self> {
        let history: Self = serde_json::from_str(json)?;
        for pair in history.migrations.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(TriggerError::OutOfOrderMigration {
                    version: pair[1].version,
                    latest: pair[0].version,
                });
            }
        }
        Ok(history)
    }

    fn check_order(&self, version: u64) -> TriggerResult<()> {
        match self.latest_version() {
            Some(latest) if version <= latest => {
                Err(TriggerError::OutOfOrderMigration { version, latest })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TriggerBuilder;
    use crate::error::testing::assert_error_kind;
    use crate::error::ErrorKind;
    use crate::introspect::{Introspect, MemoryDatabase};

    fn counter(name: &str, increment: u32) -> TriggerDefinition {
        TriggerBuilder::new()
            .name(name)
            .on("users")
            .after(["insert"])
            .when("NEW.name = 'bob'")
            .generated(true)
            .body([format!("UPDATE groups SET bob_count = bob_count + {increment}")])
            .build_trigger()
            .unwrap()
    }

    #[test]
    fn test_down_mirrors_up() {
        let migration = Migration::from_operations(
            1,
            "update_trigger_bob_tr",
            Engine::FunctionBacked,
            vec![
                TriggerOperation::Drop(counter("bob_tr", 1)),
                TriggerOperation::Create(counter("bob_tr", 2)),
            ],
        );

        assert_eq!(migration.up.len(), 4);
        assert!(migration.up[0].starts_with("DROP TRIGGER"));
        assert!(migration.up[2].contains("bob_count + 2"));
        assert!(migration.down[0].starts_with("DROP TRIGGER"));
        assert!(migration.down[1].starts_with("DROP FUNCTION"));
        assert!(migration.down[2].contains("bob_count + 1"));
    }

    #[test]
    fn test_suggest_name() {
        let diff = TriggerDiff {
            added: vec![counter("a_tr", 2), counter("b_tr", 1)],
            removed: vec![counter("a_tr", 1), counter("c_tr", 1)],
        };
        assert_eq!(
            suggest_name(&diff),
            "update_trigger_a_tr_and_create_trigger_b_tr_and_drop_trigger_c_tr"
        );
        assert_eq!(suggest_name(&TriggerDiff::default()), "noop");

        let many = TriggerDiff {
            added: (0..40).map(|i| counter(&format!("trigger_number_{i}"), 1)).collect(),
            removed: Vec::new(),
        };
        let name = suggest_name(&many);
        assert!(name.starts_with("create_triggers_trigger_number_0_and_"));
        assert!(name.len() <= MAX_MIGRATION_NAME_LENGTH);
    }

    #[test]
    fn test_apply_and_rollback() {
        let mut db = MemoryDatabase::new();
        let mut history = MigrationHistory::new();

        let first = Migration::from_operations(
            1,
            "create",
            Engine::Lightweight,
            vec![TriggerOperation::Create(counter("bob_tr", 1))],
        );
        history.apply(first, &mut db).unwrap();
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 1);

        let second = Migration::from_operations(
            2,
            "update",
            Engine::Lightweight,
            vec![
                TriggerOperation::Drop(counter("bob_tr", 1)),
                TriggerOperation::Create(counter("bob_tr", 2)),
            ],
        );
        history.apply(second, &mut db).unwrap();
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 0);
        assert_eq!(history.applied_triggers(), vec![counter("bob_tr", 2)]);

        let rolled_back = history.rollback(&mut db).unwrap().unwrap();
        assert_eq!(rolled_back.version, 2);
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 1);
        assert_eq!(history.applied_triggers(), vec![counter("bob_tr", 1)]);
        assert_eq!(db.snapshot().unwrap().len(), 1);

        history.rollback(&mut db).unwrap();
        assert!(history.rollback(&mut db).unwrap().is_none());
        assert!(db.trigger_names().is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut history = MigrationHistory::new();
        history.record(Migration::manual(5, "a", Engine::Inline, vec![], vec![])).unwrap();

        assert_error_kind(
            history.record(Migration::manual(5, "b", Engine::Inline, vec![], vec![])),
            ErrorKind::Execution,
        );
        assert!(history.next_version() > 5);
    }

    #[test]
    fn test_recorded_triggers_newest_first() {
        let mut history = MigrationHistory::new();
        history
            .record(Migration::from_operations(
                1,
                "a",
                Engine::Inline,
                vec![TriggerOperation::Create(counter("bob_tr", 1))],
            ))
            .unwrap();
        history
            .record(Migration::from_operations(
                2,
                "b",
                Engine::Inline,
                vec![
                    TriggerOperation::Drop(counter("bob_tr", 1)),
                    TriggerOperation::Create(counter("bob_tr", 2)),
                ],
            ))
            .unwrap();

        let recorded = history.recorded_triggers();
        assert_eq!(recorded, vec![counter("bob_tr", 2), counter("bob_tr", 1)]);
    }

    #[test]
    fn test_history_json() {
        let mut history = MigrationHistory::new();
        history
            .record(Migration::from_operations(
                1,
                "a",
                Engine::FunctionBacked,
                vec![TriggerOperation::Create(counter("bob_tr", 1))],
            ))
            .unwrap();

        let json = history.to_json().unwrap();
        assert!(json.contains("\"op\": \"create\""));
        assert_eq!(MigrationHistory::from_json(&json).unwrap(), history);

        let bad = r#"{"migrations": [
            {"version": 2, "name": "a", "engine": "inline", "up": [], "down": []},
            {"version": 1, "name": "b", "engine": "inline", "up": [], "down": []}
        ]}"#;
        assert_error_kind(MigrationHistory::from_json(bad), ErrorKind::Execution);
    }
}
