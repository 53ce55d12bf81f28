//! Diff Engine: declared triggers vs applied triggers
//!
//! ## Algorithm
//!
//! Sameness is string equality of compiled create DDL (the signature):
//! 1. `added` = declared triggers whose signature no applied trigger has
//! 2. `removed` = applied triggers whose signature no declared trigger has,
//!    restricted to `generated = true`; a manual trigger is only removed when
//!    a declaration with its (table, name) replaces it
//! 3. An edited trigger shows up once in each set (drop old + create new)
//!
//! A declared trigger with the same (table, name) as an applied one is rendered
//! at the applied trigger's compatibility before comparing, so a change in
//! rendering rules alone never produces a migration. When it does differ, it
//! is recreated at the higher of the two compatibility versions.
//!
//! Generation fails as a whole if any added trigger is unsupported by the
//! target engine; no DDL is produced in that case.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::builder::Declaration;
use crate::config::{TriggerConfig, CURRENT_COMPATIBILITY};
use crate::ddl::Engine;
use crate::error::{SilentSink, TracingSink, TriggerResult, WarningSink};
use crate::migration::MigrationPlan;
use crate::registry::expand;
use crate::trigger::TriggerDefinition;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDiff {
    pub added: Vec<TriggerDefinition>,
    pub removed: Vec<TriggerDefinition>,
}

impl TriggerDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// (old, new) pairs sharing a logical identity
    pub fn replaced(&self) -> Vec<(&TriggerDefinition, &TriggerDefinition)> {
        self.removed
            .iter()
            .filter_map(|old| {
                let identity = old.identity();
                self.added
                    .iter()
                    .find(|new| new.identity() == identity)
                    .map(|new| (old, new))
            })
            .collect()
    }
}

/// Compare physical triggers by compiled DDL
pub fn diff_triggers(
    engine: Engine,
    declared: &[TriggerDefinition],
    applied: &[TriggerDefinition],
) -> TriggerDiff {
    let applied_compatibility: BTreeMap<(&str, &str), u32> = applied
        .iter()
        .map(|t| (t.sort_key(), t.compatibility()))
        .collect();
    let applied_signatures: BTreeSet<String> =
        applied.iter().map(|t| engine.signature(t)).collect();

    let mut declared_signatures = BTreeSet::new();
    let mut replaced = BTreeSet::new();
    let mut added = Vec::new();
    for trigger in declared {
        let applied_at = applied_compatibility.get(&trigger.sort_key()).copied();
        let rendered = match applied_at {
            Some(compatibility) => trigger.at_compatibility(compatibility),
            None => trigger.clone(),
        };
        let signature = engine.signature(&rendered);
        if !applied_signatures.contains(&signature) {
            match applied_at {
                // Compatibility never goes backwards for a live trigger
                Some(compatibility) => {
                    replaced.insert(trigger.sort_key());
                    let compatibility = compatibility.max(trigger.compatibility());
                    added.push(trigger.at_compatibility(compatibility));
                }
                None => added.push(trigger.clone()),
            }
        }
        declared_signatures.insert(signature);
    }

    // Manual triggers are only dropped when a declaration takes over their name
    let mut removed: Vec<_> = applied
        .iter()
        .filter(|t| {
            (t.is_generated() || replaced.contains(&t.sort_key()))
                && !declared_signatures.contains(&engine.signature(t))
        })
        .cloned()
        .collect();

    added.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    removed.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    TriggerDiff { added, removed }
}

/// Turns declarations plus the applied set into a migration plan
pub struct MigrationGenerator<'a> {
    engine: Engine,
    compatibility: u32,
    sink: &'a dyn WarningSink,
}

impl<'a> MigrationGenerator<'a> {
    pub fn new(engine: Engine, sink: &'a dyn WarningSink) -> Self {
        Self {
            engine,
            compatibility: CURRENT_COMPATIBILITY,
            sink,
        }
    }

    /// Render declared triggers no newer than `compatibility`
    #[must_use]
    pub fn with_compatibility(mut self, compatibility: u32) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Physical triggers the declarations produce on this engine
    pub fn declared_triggers(
        &self,
        declared: &[Declaration],
    ) -> TriggerResult<Vec<TriggerDefinition>> {
        Ok(expand(self.engine, declared)?
            .into_iter()
            .map(|t| {
                if t.compatibility() > self.compatibility {
                    t.at_compatibility(self.compatibility)
                } else {
                    t
                }
            })
            .collect())
    }

    pub fn diff(
        &self,
        declared: &[Declaration],
        applied: &[TriggerDefinition],
    ) -> TriggerResult<TriggerDiff> {
        Ok(diff_triggers(self.engine, &self.declared_triggers(declared)?, applied))
    }

    pub fn generate(
        &self,
        declared: &[Declaration],
        applied: &[TriggerDefinition],
    ) -> TriggerResult<MigrationPlan> {
        let diff = self.diff(declared, applied)?;

        // Every added trigger must pass before anything is reported or rendered
        let mut warnings = Vec::new();
        for trigger in &diff.added {
            warnings.extend(self.engine.supports(trigger)?);
        }
        for warning in &warnings {
            self.sink.warn(warning);
        }

        let plan = MigrationPlan::from_diff(self.engine, diff);
        info!(
            engine = %self.engine,
            name = %plan.name,
            added = plan.diff.added.len(),
            removed = plan.diff.removed.len(),
            "generated trigger migration"
        );
        Ok(plan)
    }
}

impl MigrationGenerator<'static> {
    pub fn from_config(config: &TriggerConfig) -> Self {
        let sink: &'static dyn WarningSink = if config.silence_warnings {
            &SilentSink
        } else {
            &TracingSink
        };
        Self::new(config.engine, sink).with_compatibility(config.compatibility)
    }
}

/// Migration for `engine`, warnings logged through `tracing`
pub fn generate_migration(
    declared: &[Declaration],
    applied: &[TriggerDefinition],
    engine: Engine,
) -> TriggerResult<MigrationPlan> {
    MigrationGenerator::new(engine, &TracingSink).generate(declared, applied)
}

/// True when nothing would be added or removed
pub fn migrations_current(
    declared: &[Declaration],
    applied: &[TriggerDefinition],
    engine: Engine,
) -> TriggerResult<bool> {
    Ok(MigrationGenerator::new(engine, &SilentSink)
        .diff(declared, applied)?
        .is_empty())
}
