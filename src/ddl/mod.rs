//! DDL Compilation: one compiler per target engine
//!
//! Three engines cover the trigger models in common use:
//! - **Function-backed**: a named function holds the body, `CREATE TRIGGER` references it
//! - **Inline**: the body lives in `CREATE TRIGGER`; one trigger per table/timing/event
//! - **Lightweight**: inline body with an optional `WHEN`; row level only
//!
//! ## Architecture
//!
//! Every compiler implements [`TriggerCompiler`]. Rendering is a pure function
//! of the [`TriggerDefinition`] fields, so two equal values always produce
//! byte-identical statements; the diff engine and the schema dumper rely on
//! that for equality. Changing any rendering rule requires a new compatibility
//! version (see [`crate::config::CURRENT_COMPATIBILITY`]).
//!
//! Feature checks are shared: each trigger uses a set of [`Feature`]s, each
//! engine allows a set ([`Capabilities`]). A feature the target lacks is a
//! generation error; a feature the target has but another engine lacks is a
//! [`GenerationWarning`].

pub mod function_backed;
pub mod inline;
pub mod lightweight;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::Declaration;
use crate::config::{CURRENT_COMPATIBILITY, LEGACY_COMPATIBILITY};
use crate::error::{GenerationWarning, TracingSink, TriggerError, TriggerResult, WarningSink};
use crate::group::TriggerGroup;
use crate::trigger::{Event, Granularity, Security, TriggerDefinition};

pub use function_backed::FunctionBackedCompiler;
pub use inline::InlineCompiler;
pub use lightweight::LightweightCompiler;

static FUNCTION_BACKED: FunctionBackedCompiler = FunctionBackedCompiler;
static INLINE: InlineCompiler = InlineCompiler;
static LIGHTWEIGHT: LightweightCompiler = LightweightCompiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    FunctionBacked,
    Inline,
    Lightweight,
}

impl Engine {
    pub const ALL: [Engine; 3] = [Engine::FunctionBacked, Engine::Inline, Engine::Lightweight];

    pub fn compiler(self) -> &'static dyn TriggerCompiler {
        match self {
            Engine::FunctionBacked => &FUNCTION_BACKED,
            Engine::Inline => &INLINE,
            Engine::Lightweight => &LIGHTWEIGHT,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        self.compiler().capabilities()
    }

    /// Check `trigger` against this engine; warnings go to the tracing sink
    pub fn compile_create(self, trigger: &TriggerDefinition) -> TriggerResult<Vec<String>> {
        self.compile_create_with(trigger, &TracingSink)
    }

    /// Like [`Engine::compile_create`], reporting warnings to `sink`
    pub fn compile_create_with(
        self,
        trigger: &TriggerDefinition,
        sink: &dyn WarningSink,
    ) -> TriggerResult<Vec<String>> {
        for warning in self.supports(trigger)? {
            sink.warn(&warning);
        }
        Ok(self.compiler().render_create(trigger))
    }

    pub fn compile_drop(self, trigger: &TriggerDefinition) -> Vec<String> {
        self.compiler().render_drop(trigger)
    }

    pub fn supports(self, trigger: &TriggerDefinition) -> TriggerResult<Vec<GenerationWarning>> {
        self.compiler().supports(trigger)
    }

    /// Physical triggers for one declaration
    pub fn physical(self, declaration: &Declaration) -> TriggerResult<Vec<TriggerDefinition>> {
        match declaration {
            Declaration::Trigger(trigger) => Ok(vec![trigger.clone()]),
            Declaration::Group(group) => self.compiler().compile_group(group),
        }
    }

    /// Create DDL joined into the string used for equality everywhere
    pub fn signature(self, trigger: &TriggerDefinition) -> String {
        self.compiler().render_create(trigger).join("\n")
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::FunctionBacked => "function-backed engine",
            Engine::Inline => "inline engine",
            Engine::Lightweight => "lightweight engine",
        })
    }
}

/// Engine-specific trigger features
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    StatementLevel,
    MultipleEvents,
    Truncate,
    RowLevelTruncate,
    UpdateColumns,
    Declarations,
    SecurityInvoker,
    SecurityDefiner,
    SecurityPrincipal,
    EmptyBody,
    ConditionalEmptyBody,
}

impl Feature {
    /// Features `trigger` uses, in a fixed order
    pub fn of(trigger: &TriggerDefinition) -> Vec<Feature> {
        let mut features = Vec::new();
        if trigger.granularity() == Granularity::Statement {
            features.push(Feature::StatementLevel);
        }
        if trigger.events().len() > 1 {
            features.push(Feature::MultipleEvents);
        }
        if trigger.reacts_to(Event::Truncate) {
            features.push(Feature::Truncate);
            if trigger.granularity() == Granularity::Row {
                features.push(Feature::RowLevelTruncate);
            }
        }
        if !trigger.columns().is_empty() {
            features.push(Feature::UpdateColumns);
        }
        if !trigger.declarations().is_empty() {
            features.push(Feature::Declarations);
        }
        match trigger.security() {
            Some(Security::Invoker) => features.push(Feature::SecurityInvoker),
            Some(Security::Definer) => features.push(Feature::SecurityDefiner),
            Some(Security::Principal(_)) => features.push(Feature::SecurityPrincipal),
            None => {}
        }
        if trigger.body().is_empty() {
            features.push(Feature::EmptyBody);
            if trigger.condition().is_some() {
                features.push(Feature::ConditionalEmptyBody);
            }
        }
        features
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::StatementLevel => "FOR EACH STATEMENT",
            Feature::MultipleEvents => "more than one event per trigger",
            Feature::Truncate => "TRUNCATE events",
            Feature::RowLevelTruncate => "row-level TRUNCATE",
            Feature::UpdateColumns => "UPDATE OF columns",
            Feature::Declarations => "DECLARE blocks",
            Feature::SecurityInvoker => "SECURITY INVOKER",
            Feature::SecurityDefiner => "SECURITY DEFINER",
            Feature::SecurityPrincipal => "an explicit security principal",
            Feature::EmptyBody => "an empty body",
            Feature::ConditionalEmptyBody => "a condition on an empty body",
        })
    }
}

/// What an engine can express
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub statement_level: bool,
    pub multiple_events: bool,
    pub truncate: bool,
    pub row_level_truncate: bool,
    pub update_columns: bool,
    pub declarations: bool,
    pub security_invoker: bool,
    pub security_definer: bool,
    pub security_principal: bool,
    pub empty_body: bool,
    pub conditional_empty_body: bool,
    /// More than one trigger per (table, timing, event)
    pub multiple_per_slot: bool,
}

impl Capabilities {
    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::StatementLevel => self.statement_level,
            Feature::MultipleEvents => self.multiple_events,
            Feature::Truncate => self.truncate,
            Feature::RowLevelTruncate => self.row_level_truncate,
            Feature::UpdateColumns => self.update_columns,
            Feature::Declarations => self.declarations,
            Feature::SecurityInvoker => self.security_invoker,
            Feature::SecurityDefiner => self.security_definer,
            Feature::SecurityPrincipal => self.security_principal,
            Feature::EmptyBody => self.empty_body,
            Feature::ConditionalEmptyBody => self.conditional_empty_body,
        }
    }
}

/// Common interface of the engine compilers
pub trait TriggerCompiler: Sync {
    fn engine(&self) -> Engine;

    fn capabilities(&self) -> Capabilities;

    /// Statements creating `trigger`, without feature checks
    fn render_create(&self, trigger: &TriggerDefinition) -> Vec<String>;

    /// Statements removing `trigger` and anything its creation added
    fn render_drop(&self, trigger: &TriggerDefinition) -> Vec<String>;

    /// Physical triggers for a group. Engines with many triggers per slot
    /// emit one per member.
    fn compile_group(&self, group: &TriggerGroup) -> TriggerResult<Vec<TriggerDefinition>> {
        group.flatten()
    }

    fn supports(&self, trigger: &TriggerDefinition) -> TriggerResult<Vec<GenerationWarning>> {
        let engine = self.engine();
        if trigger.compatibility() > CURRENT_COMPATIBILITY {
            return Err(TriggerError::UnknownCompatibility {
                version: trigger.compatibility(),
                current: CURRENT_COMPATIBILITY,
            });
        }

        let capabilities = self.capabilities();
        let mut warnings = Vec::new();
        for feature in Feature::of(trigger) {
            if !capabilities.allows(feature) {
                return Err(TriggerError::unsupported(engine, feature, trigger.name()));
            }
            if Engine::ALL.iter().any(|other| !other.capabilities().allows(feature)) {
                warnings.push(GenerationWarning {
                    engine,
                    trigger: trigger.name().to_string(),
                    feature,
                });
            }
        }

        debug!(
            %engine,
            trigger = trigger.name(),
            warnings = warnings.len(),
            "checked trigger support"
        );
        Ok(warnings)
    }
}

/// Reject two triggers on one (table, timing, event) for single-slot engines
pub fn check_slots(engine: Engine, triggers: &[TriggerDefinition]) -> TriggerResult<()> {
    if engine.capabilities().multiple_per_slot {
        return Ok(());
    }

    let mut slots: BTreeMap<_, Vec<String>> = BTreeMap::new();
    for trigger in triggers {
        for slot in trigger.slots() {
            slots.entry(slot).or_default().push(trigger.name().to_string());
        }
    }

    match slots.into_iter().find(|(_, names)| names.len() > 1) {
        Some(((table, timing, event), triggers)) => Err(TriggerError::DuplicateSlot {
            engine: engine.to_string(),
            slot: format!("{table} {timing} {event}"),
            triggers,
        }),
        None => Ok(()),
    }
}

/// `INSERT OR UPDATE OF a, b OR DELETE`
pub(crate) fn events_clause(trigger: &TriggerDefinition) -> String {
    trigger
        .events()
        .iter()
        .map(|event| match event {
            Event::Update if !trigger.columns().is_empty() => {
                format!("UPDATE OF {}", trigger.columns().join(", "))
            }
            other => other.as_sql().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Condition as written in `WHEN`/`IF` for engines whose legacy rendering
/// left it bare
pub(crate) fn condition_clause(condition: &str, compatibility: u32) -> String {
    if compatibility == LEGACY_COMPATIBILITY {
        condition.to_string()
    } else {
        format!("({condition})")
    }
}

/// Indent every non-empty line by one level
pub(crate) fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("    {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TriggerBuilder;
    use crate::error::testing::{assert_error_contains, assert_error_kind};
    use crate::error::{CollectingSink, ErrorKind};
    use proptest::prelude::*;

    fn trigger(builder: TriggerBuilder) -> TriggerDefinition {
        builder.build_trigger().unwrap()
    }

    fn base() -> TriggerBuilder {
        TriggerBuilder::new()
            .on("users")
            .after(["insert"])
            .body(["UPDATE groups SET bob_count = bob_count + 1"])
    }

    #[test]
    fn test_engine_serde_names() {
        assert_eq!(serde_json::to_string(&Engine::FunctionBacked).unwrap(), "\"function_backed\"");
        assert_eq!(serde_json::from_str::<Engine>("\"lightweight\"").unwrap(), Engine::Lightweight);
    }

    #[test]
    fn test_features_of_trigger() {
        let t = trigger(
            base()
                .after(["update", "truncate"])
                .of(["name"])
                .security("invoker")
                .declare(["n int"]),
        );
        assert_eq!(
            Feature::of(&t),
            vec![
                Feature::MultipleEvents,
                Feature::Truncate,
                Feature::RowLevelTruncate,
                Feature::UpdateColumns,
                Feature::Declarations,
                Feature::SecurityInvoker,
            ]
        );
    }

    #[test]
    fn test_statement_level_only_on_function_backed() {
        let t = trigger(base().for_each("statement"));

        let warnings = Engine::FunctionBacked.supports(&t).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].feature, Feature::StatementLevel);

        assert_error_contains(Engine::Inline.supports(&t), "FOR EACH STATEMENT");
        assert_error_kind(Engine::Lightweight.compile_create(&t), ErrorKind::Generation);
    }

    #[test]
    fn test_security_support_matrix() {
        let principal = trigger(base().security("'app'@'localhost'"));
        assert_error_kind(Engine::FunctionBacked.supports(&principal), ErrorKind::Generation);
        assert!(Engine::Inline.supports(&principal).is_ok());
        assert_error_kind(Engine::Lightweight.supports(&principal), ErrorKind::Generation);

        let invoker = trigger(base().security("invoker"));
        assert!(Engine::FunctionBacked.supports(&invoker).is_ok());
        assert_error_kind(Engine::Inline.supports(&invoker), ErrorKind::Generation);
    }

    #[test]
    fn test_truncate_needs_statement_level() {
        let row = trigger(base().after(["truncate"]));
        assert_error_contains(Engine::FunctionBacked.supports(&row), "row-level TRUNCATE");

        let statement = trigger(base().after(["truncate"]).for_each("statement"));
        assert!(Engine::FunctionBacked.supports(&statement).is_ok());
        assert_error_kind(Engine::Inline.supports(&statement), ErrorKind::Generation);
    }

    #[test]
    fn test_portable_trigger_has_no_warnings() {
        let t = trigger(base().when("NEW.name = 'bob'"));
        for engine in Engine::ALL {
            assert!(engine.supports(&t).unwrap().is_empty(), "{engine}");
        }
    }

    #[test]
    fn test_compile_create_reports_to_given_sink() {
        let t = trigger(base().for_each("statement"));

        let sink = CollectingSink::default();
        let ddl = Engine::FunctionBacked.compile_create_with(&t, &sink).unwrap();
        assert_eq!(ddl, Engine::FunctionBacked.compile_create(&t).unwrap());
        let warnings = sink.take();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].feature, Feature::StatementLevel);

        let silent = CollectingSink::default();
        Engine::FunctionBacked.compile_create_with(&trigger(base()), &silent).unwrap();
        assert!(silent.take().is_empty());
    }

    #[test]
    fn test_condition_on_empty_body() {
        let t = trigger(base().when("NEW.name = 'bob'").body(Vec::<String>::new()));
        assert_eq!(Feature::of(&t), vec![Feature::EmptyBody, Feature::ConditionalEmptyBody]);

        assert!(Engine::FunctionBacked.supports(&t).is_ok());
        assert_error_contains(Engine::Inline.supports(&t), "a condition on an empty body");
        assert_error_kind(Engine::Lightweight.supports(&t), ErrorKind::Generation);
    }

    #[test]
    fn test_check_slots() {
        let a = trigger(base().name("a_tr"));
        let b = trigger(base().name("b_tr"));

        assert!(check_slots(Engine::Lightweight, &[a.clone(), b.clone()]).is_ok());
        assert_error_contains(check_slots(Engine::Inline, &[a, b]), "a_tr, b_tr");
    }

    #[test]
    fn test_events_clause() {
        let t = trigger(base().after(["delete", "update", "insert"]).of(["name", "email"]));
        assert_eq!(events_clause(&t), "INSERT OR UPDATE OF name, email OR DELETE");
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb"), "    a\n\n    b");
    }

    proptest! {
        #[test]
        fn prop_compilation_is_deterministic(
            value in 0u32..1000,
            column in "[a-z][a-z_]{0,10}",
            legacy in any::<bool>(),
        ) {
            let condition = format!("NEW.{column} > {value}");
            let compatibility = if legacy { LEGACY_COMPATIBILITY } else { CURRENT_COMPATIBILITY };
            let build = || {
                base()
                    .when(condition.clone())
                    .compatibility(compatibility)
                    .build_trigger()
                    .unwrap()
            };

            for engine in Engine::ALL {
                let first = engine.compile_create(&build()).unwrap();
                let second = engine.compile_create(&build()).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(engine.compile_drop(&build()), engine.compile_drop(&build()));
            }
        }
    }
}
