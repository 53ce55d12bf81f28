//! Declared triggers for one application
//!
//! Model-level declarations (`declare`) are stamped `generated = true`, which
//! makes them eligible for removal when they disappear from the registry.
//! Hand-registered values keep whatever `generated` flag they were built with.

use std::collections::BTreeSet;

use tracing::debug;

use crate::builder::{Declaration, TriggerBuilder};
use crate::ddl::{check_slots, Engine};
use crate::error::{TriggerError, TriggerResult};
use crate::trigger::TriggerDefinition;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    declarations: Vec<Declaration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every declaration
    pub fn reset(&mut self) {
        self.declarations.clear();
    }

    pub fn register(&mut self, declaration: impl Into<Declaration>) {
        let declaration = declaration.into();
        debug!(
            name = %declaration.name(),
            table = declaration.table(),
            "registered trigger declaration"
        );
        self.declarations.push(declaration);
    }

    /// Build a model-level declaration and register it
    pub fn declare(&mut self, builder: TriggerBuilder) -> TriggerResult<()> {
        let declaration = builder.generated(true).build()?;
        self.register(declaration);
        Ok(())
    }

    pub fn all(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Physical triggers `engine` would create, sorted by (table, name)
    pub fn physical(&self, engine: Engine) -> TriggerResult<Vec<TriggerDefinition>> {
        expand(engine, &self.declarations)
    }
}

/// Expand declarations into physical triggers, rejecting duplicate names and
/// slot conflicts on single-slot engines
pub(crate) fn expand(
    engine: Engine,
    declarations: &[Declaration],
) -> TriggerResult<Vec<TriggerDefinition>> {
    let mut physical = Vec::new();
    for declaration in declarations {
        physical.extend(engine.physical(declaration)?);
    }
    check_duplicate_names(&physical)?;
    check_slots(engine, &physical)?;
    physical.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(physical)
}

pub(crate) fn check_duplicate_names(triggers: &[TriggerDefinition]) -> TriggerResult<()> {
    let mut seen = BTreeSet::new();
    for trigger in triggers {
        if !seen.insert(trigger.sort_key()) {
            return Err(TriggerError::DuplicateName {
                table: trigger.table().to_string(),
                name: trigger.name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_kind;
    use crate::error::ErrorKind;
    use crate::trigger::Event;

    fn counter(condition: &str) -> TriggerBuilder {
        TriggerBuilder::new()
            .on("users")
            .after([Event::Insert])
            .when(condition)
            .body(["UPDATE groups SET bob_count = bob_count + 1"])
    }

    #[test]
    fn test_declare_marks_generated() {
        let mut registry = Registry::new();
        registry.declare(counter("NEW.name = 'bob'")).unwrap();
        registry.register(counter("NEW.name = 'eve'").build().unwrap());

        assert_eq!(registry.len(), 2);
        assert!(registry.all()[0].is_generated());
        assert!(!registry.all()[1].is_generated());

        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_physical_is_sorted() {
        let mut registry = Registry::new();
        registry.declare(counter("TRUE").name("z_tr")).unwrap();
        registry.declare(counter("TRUE").name("a_tr")).unwrap();

        let names: Vec<_> = registry
            .physical(Engine::Lightweight)
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["a_tr", "z_tr"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = Registry::new();
        registry.declare(counter("NEW.a").name("same_tr")).unwrap();
        registry.declare(counter("NEW.b").name("same_tr")).unwrap();

        assert_error_kind(registry.physical(Engine::Lightweight), ErrorKind::Declaration);
    }
}
