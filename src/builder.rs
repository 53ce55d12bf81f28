//! Builder: chained trigger declarations frozen into immutable values
//!
//! ```rust
//! use trigger_forge::{Engine, Event, TriggerBuilder};
//!
//! let trigger = TriggerBuilder::new()
//!     .on("users")
//!     .after([Event::Insert])
//!     .when("NEW.name = 'bob'")
//!     .body(["UPDATE groups SET bob_count = bob_count + 1"])
//!     .build_trigger()
//!     .unwrap();
//!
//! let ddl = Engine::Lightweight.compile_create(&trigger).unwrap();
//! assert!(ddl[0].contains("WHEN (NEW.name = 'bob')"));
//! ```
//!
//! Every call replaces what an earlier call for the same attribute set; nothing
//! is merged. Invalid values (e.g. `timing("sideways")`) are remembered and
//! reported as a `DeclarationError` when the builder is frozen, unless a later
//! call for the same attribute replaced them.
//!
//! Groups are declared with [`TriggerBuilder::branch`]; each branch only sets
//! its own name, condition, declarations and body (or further branches).

use std::collections::{BTreeMap, BTreeSet};

use crate::config::CURRENT_COMPATIBILITY;
use crate::ddl::Engine;
use crate::error::{TriggerError, TriggerResult, WarningSink};
use crate::group::{resolve_placeholders, GroupMember, MemberAction, TriggerGroup};
use crate::trigger::{
    canonical_body, derived_name, Event, Granularity, Security, Timing, TriggerDefinition,
};
use crate::validation::{validate_column_name, validate_sql_identifier, validate_table_name};

/// Values accepted wherever a timing is expected
pub trait IntoTiming {
    fn into_timing(self) -> TriggerResult<Timing>;
}

impl IntoTiming for Timing {
    fn into_timing(self) -> TriggerResult<Timing> {
        Ok(self)
    }
}

impl IntoTiming for &str {
    fn into_timing(self) -> TriggerResult<Timing> {
        self.parse()
    }
}

/// Values accepted wherever an event is expected
pub trait IntoEvent {
    fn into_event(self) -> TriggerResult<Event>;
}

impl IntoEvent for Event {
    fn into_event(self) -> TriggerResult<Event> {
        Ok(self)
    }
}

impl IntoEvent for &str {
    fn into_event(self) -> TriggerResult<Event> {
        self.parse()
    }
}

/// Values accepted wherever a granularity is expected
pub trait IntoGranularity {
    fn into_granularity(self) -> TriggerResult<Granularity>;
}

impl IntoGranularity for Granularity {
    fn into_granularity(self) -> TriggerResult<Granularity> {
        Ok(self)
    }
}

impl IntoGranularity for &str {
    fn into_granularity(self) -> TriggerResult<Granularity> {
        self.parse()
    }
}

/// What a builder freezes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Trigger(TriggerDefinition),
    Group(TriggerGroup),
}

impl Declaration {
    pub fn name(&self) -> String {
        match self {
            Declaration::Trigger(t) => t.name().to_string(),
            Declaration::Group(g) => g.name(),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Declaration::Trigger(t) => t.table(),
            Declaration::Group(g) => g.table(),
        }
    }

    pub fn is_generated(&self) -> bool {
        match self {
            Declaration::Trigger(t) => t.is_generated(),
            Declaration::Group(g) => g.is_generated(),
        }
    }
}

impl From<TriggerDefinition> for Declaration {
    fn from(trigger: TriggerDefinition) -> Self {
        Declaration::Trigger(trigger)
    }
}

impl From<TriggerGroup> for Declaration {
    fn from(group: TriggerGroup) -> Self {
        Declaration::Group(group)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerBuilder {
    name: Option<String>,
    table: Option<String>,
    timing: Option<TriggerResult<Timing>>,
    events: Option<TriggerResult<Vec<Event>>>,
    columns: Option<Vec<String>>,
    granularity: Option<TriggerResult<Granularity>>,
    condition: Option<String>,
    security: Option<Security>,
    declarations: Vec<String>,
    bindings: BTreeMap<String, String>,
    body: Option<Vec<String>>,
    branches: Vec<TriggerBuilder>,
    generated: Option<bool>,
    compatibility: Option<u32>,
}

impl TriggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn on(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn for_each(mut self, granularity: impl IntoGranularity) -> Self {
        self.granularity = Some(granularity.into_granularity());
        self
    }

    /// `timing(BEFORE)` + `events(...)`
    #[must_use]
    pub fn before<I>(self, events: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoEvent,
    {
        self.timing(Timing::Before).events(events)
    }

    /// `timing(AFTER)` + `events(...)`
    #[must_use]
    pub fn after<I>(self, events: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoEvent,
    {
        self.timing(Timing::After).events(events)
    }

    #[must_use]
    pub fn timing(mut self, timing: impl IntoTiming) -> Self {
        self.timing = Some(timing.into_timing());
        self
    }

    #[must_use]
    pub fn events<I>(mut self, events: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoEvent,
    {
        self.events = Some(events.into_iter().map(IntoEvent::into_event).collect());
        self
    }

    /// Condition on the row change (the SQL `WHEN` clause)
    #[must_use]
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Unconditional branch marker; clears any condition
    #[must_use]
    pub fn all(mut self) -> Self {
        self.condition = None;
        self
    }

    /// Restrict UPDATE triggers to changes of these columns
    #[must_use]
    pub fn of<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn security(mut self, security: impl Into<Security>) -> Self {
        self.security = Some(security.into());
        self
    }

    /// Local variables for function-backed bodies
    #[must_use]
    pub fn declare<I, S>(mut self, declarations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declarations = declarations.into_iter().map(Into::into).collect();
        self
    }

    /// Value substituted for `{key}` in conditions
    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn generated(mut self, generated: bool) -> Self {
        self.generated = Some(generated);
        self
    }

    #[must_use]
    pub fn compatibility(mut self, compatibility: u32) -> Self {
        self.compatibility = Some(compatibility);
        self
    }

    /// SQL executed when the trigger fires; the final statement is terminated automatically
    #[must_use]
    pub fn body<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body = Some(statements.into_iter().map(Into::into).collect());
        self
    }

    /// Add a group member configured by `configure`
    #[must_use]
    pub fn branch<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(TriggerBuilder) -> TriggerBuilder,
    {
        self.branches.push(configure(TriggerBuilder::new()));
        self
    }

    pub fn is_group(&self) -> bool {
        !self.branches.is_empty()
    }

    /// Freeze into a trigger (no branches) or a group
    pub fn build(self) -> TriggerResult<Declaration> {
        if self.is_group() {
            self.build_group().map(Declaration::Group)
        } else {
            self.build_single().map(Declaration::Trigger)
        }
    }

    /// Freeze, failing if branches were declared
    pub fn build_trigger(self) -> TriggerResult<TriggerDefinition> {
        match self.build()? {
            Declaration::Trigger(trigger) => Ok(trigger),
            Declaration::Group(group) => {
                Err(TriggerError::NotASingleTrigger { name: group.name() })
            }
        }
    }

    /// Freeze and check every physical trigger against `engine`.
    /// Portability warnings go to `sink`; unsupported features are errors.
    pub fn validate(self, engine: Engine, sink: &dyn WarningSink) -> TriggerResult<Declaration> {
        let declaration = self.build()?;
        for trigger in engine.physical(&declaration)? {
            for warning in engine.supports(&trigger)? {
                sink.warn(&warning);
            }
        }
        Ok(declaration)
    }

    fn build_single(self) -> TriggerResult<TriggerDefinition> {
        let shared = self.shared()?;
        let condition = self
            .condition
            .as_deref()
            .map(|c| resolve_placeholders(c, &self.bindings))
            .transpose()?
            .filter(|c| !c.is_empty());
        let name = match self.name {
            Some(name) => name,
            None => derived_name(
                &shared.table,
                shared.timing,
                &shared.events,
                shared.granularity,
                condition.as_deref(),
            ),
        };
        validate_sql_identifier(&name, "trigger name")?;
        let body = self.body.ok_or(TriggerError::MissingField { field: "body" })?;

        Ok(TriggerDefinition {
            name,
            table: shared.table,
            timing: shared.timing,
            events: shared.events,
            columns: shared.columns,
            granularity: shared.granularity,
            condition,
            security: shared.security,
            declarations: canonical_body(&self.declarations),
            body: canonical_body(body),
            compatibility: shared.compatibility,
            generated: shared.generated,
        })
    }

    fn build_group(self) -> TriggerResult<TriggerGroup> {
        let shared = self.shared()?;
        if let Some(name) = &self.name {
            validate_sql_identifier(name, "trigger name")?;
        }
        let group_name = self.name.clone().unwrap_or_else(|| {
            derived_name(&shared.table, shared.timing, &shared.events, shared.granularity, None)
        });
        if self.body.is_some() {
            return Err(TriggerError::BodyOnGroup { group: group_name });
        }

        let members = self
            .branches
            .into_iter()
            .map(|branch| branch.into_member(&group_name, &shared))
            .collect::<TriggerResult<Vec<_>>>()?;

        let group = TriggerGroup {
            name: self.name,
            table: shared.table,
            timing: shared.timing,
            events: shared.events,
            columns: shared.columns,
            granularity: shared.granularity,
            security: shared.security,
            declarations: canonical_body(&self.declarations),
            bindings: self.bindings,
            members,
            compatibility: shared.compatibility,
            generated: shared.generated,
        };
        // Unresolved placeholders surface at build time
        for trigger in group.flatten()? {
            validate_sql_identifier(trigger.name(), "trigger name")?;
        }
        Ok(group)
    }

    fn into_member(self, group: &str, shared: &Shared) -> TriggerResult<GroupMember> {
        self.check_no_override(group, shared)?;
        if let Some(name) = &self.name {
            validate_sql_identifier(name, "trigger name")?;
        }

        let action = if self.branches.is_empty() {
            let body = canonical_body(self.body.unwrap_or_default());
            if body.is_empty() {
                return Err(TriggerError::EmptyGroupMember {
                    group: group.to_string(),
                });
            }
            MemberAction::Body(body)
        } else {
            if self.body.is_some() {
                return Err(TriggerError::BodyOnGroup {
                    group: group.to_string(),
                });
            }
            let nested = self
                .branches
                .into_iter()
                .map(|branch| branch.into_member(group, shared))
                .collect::<TriggerResult<Vec<_>>>()?;
            MemberAction::Nested(nested)
        };

        Ok(GroupMember {
            name: self.name,
            condition: self
                .condition
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            declarations: canonical_body(&self.declarations),
            bindings: self.bindings,
            action,
        })
    }

    /// Members may repeat a shared attribute but not change it
    fn check_no_override(&self, group: &str, shared: &Shared) -> TriggerResult<()> {
        let overridden = |field: &'static str| TriggerError::GroupMemberOverride {
            group: group.to_string(),
            field,
        };

        if self.table.as_ref().is_some_and(|t| t != &shared.table) {
            return Err(overridden("table"));
        }
        if let Some(timing) = &self.timing {
            if timing.clone()? != shared.timing {
                return Err(overridden("timing"));
            }
        }
        if let Some(events) = &self.events {
            let events: BTreeSet<Event> = events.clone()?.into_iter().collect();
            if events != shared.events {
                return Err(overridden("events"));
            }
        }
        if let Some(granularity) = &self.granularity {
            if granularity.clone()? != shared.granularity {
                return Err(overridden("granularity"));
            }
        }
        if self.columns.as_ref().is_some_and(|c| c != &shared.columns) {
            return Err(overridden("columns"));
        }
        if self.security.is_some() && self.security != shared.security {
            return Err(overridden("security"));
        }
        if self.generated.is_some_and(|g| g != shared.generated) {
            return Err(overridden("generated"));
        }
        if self.compatibility.is_some_and(|c| c != shared.compatibility) {
            return Err(overridden("compatibility"));
        }
        Ok(())
    }

    /// Validate the attributes a trigger and all members of a group share
    fn shared(&self) -> TriggerResult<Shared> {
        let table = self
            .table
            .clone()
            .ok_or(TriggerError::MissingField { field: "table" })?;
        validate_table_name(&table)?;

        let timing = self
            .timing
            .clone()
            .ok_or(TriggerError::MissingField { field: "timing" })??;

        let events: BTreeSet<Event> = self
            .events
            .clone()
            .ok_or(TriggerError::MissingField { field: "events" })??
            .into_iter()
            .collect();
        if events.is_empty() {
            return Err(TriggerError::EmptyEvents { table });
        }

        let granularity = self.granularity.clone().transpose()?.unwrap_or_default();

        let columns = self.columns.clone().unwrap_or_default();
        for column in &columns {
            validate_column_name(column)?;
        }
        if !columns.is_empty() && !events.contains(&Event::Update) {
            return Err(TriggerError::ColumnsWithoutUpdate {
                trigger: self.name.clone().unwrap_or_else(|| table.clone()),
            });
        }

        if let Some(Security::Principal(principal)) = &self.security {
            if principal.is_empty() || principal.contains(char::is_whitespace) {
                return Err(TriggerError::InvalidIdentifier {
                    parameter: "security principal".to_string(),
                    value: principal.clone(),
                    reason: "Principal must be a single non-empty token".to_string(),
                });
            }
        }

        let compatibility = self.compatibility.unwrap_or(CURRENT_COMPATIBILITY);
        if compatibility > CURRENT_COMPATIBILITY {
            return Err(TriggerError::UnknownCompatibility {
                version: compatibility,
                current: CURRENT_COMPATIBILITY,
            });
        }

        Ok(Shared {
            table,
            timing,
            events,
            columns,
            granularity,
            security: self.security.clone(),
            compatibility,
            generated: self.generated.unwrap_or(false),
        })
    }
}

struct Shared {
    table: String,
    timing: Timing,
    events: BTreeSet<Event>,
    columns: Vec<String>,
    granularity: Granularity,
    security: Option<Security>,
    compatibility: u32,
    generated: bool,
}
