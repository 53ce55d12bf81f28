//! Trigger Groups: several conditional reactions to one (table, timing, event)
//!
//! A group is an ordered list of members. Each member either carries a body
//! or nests further members; conditions along the path are AND-ed. Order is
//! significant and preserved.
//!
//! Engines that allow many triggers per slot compile a group with
//! [`TriggerGroup::flatten`] into one physical trigger per member. The inline
//! engine merges members into a single trigger instead (see `ddl::inline`).
//!
//! Conditions may contain `{name}` placeholders. They stay unresolved in the
//! group and are substituted when it is flattened or merged. A member sees the
//! group's bindings plus those of the members enclosing it and its own; a
//! sibling's bindings are never visible.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::OnceCell;
use regex::{Captures, Regex};

use crate::error::{TriggerError, TriggerResult};
use crate::trigger::{derived_name, Event, Granularity, Security, Timing, TriggerDefinition};

static PLACEHOLDER: OnceCell<Regex> = OnceCell::new();

fn placeholder_pattern() -> TriggerResult<&'static Regex> {
    PLACEHOLDER
        .get_or_try_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}"))
        .map_err(TriggerError::from)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerGroup {
    pub(crate) name: Option<String>,
    pub(crate) table: String,
    pub(crate) timing: Timing,
    pub(crate) events: BTreeSet<Event>,
    pub(crate) columns: Vec<String>,
    pub(crate) granularity: Granularity,
    pub(crate) security: Option<Security>,
    pub(crate) declarations: Vec<String>,
    pub(crate) bindings: BTreeMap<String, String>,
    pub(crate) members: Vec<GroupMember>,
    pub(crate) compatibility: u32,
    pub(crate) generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub(crate) name: Option<String>,
    /// `None` is the unconditional (`all`) branch
    pub(crate) condition: Option<String>,
    pub(crate) declarations: Vec<String>,
    /// Placeholder values for this member and its nested members
    pub(crate) bindings: BTreeMap<String, String>,
    pub(crate) action: MemberAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberAction {
    Body(Vec<String>),
    Nested(Vec<GroupMember>),
}

/// A resolved, non-nested member ready to be merged into one trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergeBranch {
    pub condition: Option<String>,
    pub body: Vec<String>,
}

impl GroupMember {
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.action, MemberAction::Nested(_))
    }

    /// `enclosing` bindings overridden by this member's own
    fn scope(&self, enclosing: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut scope = enclosing.clone();
        scope.extend(self.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        scope
    }
}

impl TriggerGroup {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Explicit group name, or the name a merged trigger would get
    pub fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            derived_name(&self.table, self.timing, &self.events, self.granularity, None)
        })
    }

    pub fn has_nested(&self) -> bool {
        self.members.iter().any(GroupMember::is_nested)
    }

    /// One physical trigger per body-carrying member, conditions AND-ed along the path
    pub fn flatten(&self) -> TriggerResult<Vec<TriggerDefinition>> {
        let mut out = Vec::new();
        let mut conditions = Vec::new();
        let mut declarations = self.declarations.clone();
        self.walk(&self.members, &self.bindings, &mut conditions, &mut declarations, &mut out)?;
        Ok(out)
    }

    fn walk(
        &self,
        members: &[GroupMember],
        bindings: &BTreeMap<String, String>,
        conditions: &mut Vec<String>,
        declarations: &mut Vec<String>,
        out: &mut Vec<TriggerDefinition>,
    ) -> TriggerResult<()> {
        for member in members {
            let scope = member.scope(bindings);
            let pushed_condition = match &member.condition {
                Some(condition) => {
                    conditions.push(resolve_placeholders(condition, &scope)?);
                    true
                }
                None => false,
            };
            let declared_before = declarations.len();
            declarations.extend(member.declarations.iter().cloned());

            match &member.action {
                MemberAction::Body(body) => {
                    let condition = conjunction(conditions);
                    let name = member.name.clone().unwrap_or_else(|| {
                        derived_name(
                            &self.table,
                            self.timing,
                            &self.events,
                            self.granularity,
                            condition.as_deref(),
                        )
                    });
                    out.push(self.physical(name, condition, declarations.clone(), body.clone()));
                }
                MemberAction::Nested(children) => {
                    self.walk(children, &scope, conditions, declarations, out)?;
                }
            }

            declarations.truncate(declared_before);
            if pushed_condition {
                conditions.pop();
            }
        }
        Ok(())
    }

    /// Top-level members with resolved conditions, in declaration order.
    /// Callers reject nested groups before merging.
    pub(crate) fn merge_branches(&self) -> TriggerResult<Vec<MergeBranch>> {
        self.members
            .iter()
            .map(|member| {
                let condition = member
                    .condition
                    .as_deref()
                    .map(|c| resolve_placeholders(c, &member.scope(&self.bindings)))
                    .transpose()?;
                let body = match &member.action {
                    MemberAction::Body(body) => body.clone(),
                    MemberAction::Nested(_) => Vec::new(),
                };
                Ok(MergeBranch { condition, body })
            })
            .collect()
    }

    /// Declarations of the group and every member, for a merged trigger
    pub(crate) fn all_declarations(&self) -> Vec<String> {
        let mut declarations = self.declarations.clone();
        for member in &self.members {
            declarations.extend(member.declarations.iter().cloned());
        }
        declarations
    }

    /// Physical trigger sharing this group's table/timing/events/settings
    pub(crate) fn physical(
        &self,
        name: String,
        condition: Option<String>,
        declarations: Vec<String>,
        body: Vec<String>,
    ) -> TriggerDefinition {
        TriggerDefinition {
            name,
            table: self.table.clone(),
            timing: self.timing,
            events: self.events.clone(),
            columns: self.columns.clone(),
            granularity: self.granularity,
            condition,
            security: self.security.clone(),
            declarations,
            body,
            compatibility: self.compatibility,
            generated: self.generated,
        }
    }
}

fn conjunction(conditions: &[String]) -> Option<String> {
    match conditions {
        [] => None,
        [only] => Some(only.clone()),
        many => Some(
            many.iter()
                .map(|c| format!("({c})"))
                .collect::<Vec<_>>()
                .join(" AND "),
        ),
    }
}

/// Substitute `{name}` placeholders from `bindings`
pub(crate) fn resolve_placeholders(
    condition: &str,
    bindings: &BTreeMap<String, String>,
) -> TriggerResult<String> {
    let mut missing = None;
    let resolved = placeholder_pattern()?.replace_all(condition, |caps: &Captures| {
        let key = &caps[1];
        match bindings.get(key) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(placeholder) => Err(TriggerError::UnresolvedPlaceholder {
            placeholder,
            condition: condition.to_string(),
        }),
        None => Ok(resolved.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_kind;
    use crate::ErrorKind;

    fn member(condition: Option<&str>, body: &str) -> GroupMember {
        GroupMember {
            name: None,
            condition: condition.map(str::to_string),
            declarations: Vec::new(),
            bindings: BTreeMap::new(),
            action: MemberAction::Body(vec![body.to_string()]),
        }
    }

    fn group(members: Vec<GroupMember>) -> TriggerGroup {
        TriggerGroup {
            name: None,
            table: "users".to_string(),
            timing: Timing::After,
            events: [Event::Update].into_iter().collect(),
            columns: Vec::new(),
            granularity: Granularity::Row,
            security: None,
            declarations: Vec::new(),
            bindings: BTreeMap::new(),
            members,
            compatibility: 1,
            generated: true,
        }
    }

    #[test]
    fn test_resolve_placeholders() {
        let bindings: BTreeMap<_, _> = [("status".to_string(), "'active'".to_string())].into();

        assert_eq!(
            resolve_placeholders("NEW.status = {status}", &bindings).unwrap(),
            "NEW.status = 'active'"
        );
        // JSON-ish literals are not placeholders
        assert_eq!(
            resolve_placeholders(r#"NEW.data = '{"a":1}'"#, &bindings).unwrap(),
            r#"NEW.data = '{"a":1}'"#
        );
        assert_error_kind(
            resolve_placeholders("NEW.kind = {kind}", &bindings),
            ErrorKind::Declaration,
        );
    }

    #[test]
    fn test_flatten_preserves_order_and_conditions() {
        let g = group(vec![
            member(Some("NEW.a > 1"), "SELECT 1;"),
            member(None, "SELECT 2;"),
        ]);

        let triggers = g.flatten().unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].condition(), Some("NEW.a > 1"));
        assert_eq!(triggers[1].condition(), None);
        assert_eq!(triggers[1].name(), "users_after_update_row_tr");
        assert_ne!(triggers[0].name(), triggers[1].name());
        assert!(triggers.iter().all(|t| t.is_generated()));
    }

    #[test]
    fn test_flatten_nested_conjoins_conditions() {
        let nested = GroupMember {
            name: None,
            condition: Some("NEW.kind = {kind}".to_string()),
            declarations: vec!["n int;".to_string()],
            bindings: BTreeMap::new(),
            action: MemberAction::Nested(vec![
                member(Some("NEW.a > 1"), "SELECT 1;"),
                member(None, "SELECT 2;"),
            ]),
        };
        let mut g = group(vec![nested, member(Some("NEW.b"), "SELECT 3;")]);
        g.bindings.insert("kind".to_string(), "'x'".to_string());

        let triggers = g.flatten().unwrap();
        assert_eq!(triggers.len(), 3);
        assert_eq!(triggers[0].condition(), Some("(NEW.kind = 'x') AND (NEW.a > 1)"));
        assert_eq!(triggers[1].condition(), Some("NEW.kind = 'x'"));
        assert_eq!(triggers[0].declarations(), ["n int;".to_string()]);
        assert_eq!(triggers[2].condition(), Some("NEW.b"));
        assert!(triggers[2].declarations().is_empty());
        assert!(g.has_nested());
    }

    #[test]
    fn test_merge_branches_resolves_conditions() {
        let mut g = group(vec![member(Some("NEW.x = {v}"), "SELECT 1;")]);
        g.bindings.insert("v".to_string(), "2".to_string());

        let branches = g.merge_branches().unwrap();
        assert_eq!(branches[0].condition.as_deref(), Some("NEW.x = 2"));
        assert_eq!(g.name(), "users_after_update_row_tr");
    }

    #[test]
    fn test_member_bindings_scoped_to_subtree() {
        let mut own = member(Some("NEW.x = {v}"), "SELECT 1;");
        own.bindings.insert("v".to_string(), "2".to_string());
        let inherited = member(Some("NEW.y = {v}"), "SELECT 2;");

        let mut g = group(vec![own.clone(), inherited.clone()]);
        g.bindings.insert("v".to_string(), "1".to_string());
        let triggers = g.flatten().unwrap();
        assert_eq!(triggers[0].condition(), Some("NEW.x = 2"));
        assert_eq!(triggers[1].condition(), Some("NEW.y = 1"));

        let branches = g.merge_branches().unwrap();
        assert_eq!(branches[1].condition.as_deref(), Some("NEW.y = 1"));

        let unbound = group(vec![own, inherited]);
        assert_error_kind(unbound.flatten(), ErrorKind::Declaration);
        assert_error_kind(unbound.merge_branches(), ErrorKind::Declaration);
    }
}
