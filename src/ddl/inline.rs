//! Inline engine: body inlined into `CREATE TRIGGER`, one trigger per
//! (table, timing, event).
//!
//! Conditions become an `IF ... THEN ... END IF;` around the body. A group is
//! merged into one trigger whose body dispatches on the member conditions in
//! declaration order; the first condition that holds wins and the rest are
//! skipped, even when they overlap.

use crate::ddl::{condition_clause, events_clause, indent, Capabilities, Engine, TriggerCompiler};
use crate::error::{TriggerError, TriggerResult};
use crate::group::{MergeBranch, TriggerGroup};
use crate::trigger::{Security, TriggerDefinition};

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineCompiler;

impl TriggerCompiler for InlineCompiler {
    fn engine(&self) -> Engine {
        Engine::Inline
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            statement_level: false,
            multiple_events: false,
            truncate: false,
            row_level_truncate: false,
            update_columns: false,
            declarations: false,
            security_invoker: false,
            security_definer: true,
            security_principal: true,
            empty_body: true,
            conditional_empty_body: false,
            multiple_per_slot: false,
        }
    }

    fn render_create(&self, trigger: &TriggerDefinition) -> Vec<String> {
        let definer = match trigger.security() {
            Some(Security::Definer) => "DEFINER = CURRENT_USER ".to_string(),
            Some(Security::Principal(principal)) => format!("DEFINER = {principal} "),
            Some(Security::Invoker) | None => String::new(),
        };

        let mut lines = vec![
            format!(
                "CREATE {definer}TRIGGER {} {} {} ON {}",
                trigger.name(),
                trigger.timing().as_sql(),
                events_clause(trigger),
                trigger.table(),
            ),
            format!("FOR EACH {}", trigger.granularity().as_sql()),
            "BEGIN".to_string(),
        ];

        // A condition on an empty body is rejected by supports()
        let body = trigger.body().join("\n");
        match trigger.condition() {
            Some(condition) if !body.is_empty() => {
                let condition = condition_clause(condition, trigger.compatibility());
                lines.push(indent(&format!("IF {condition} THEN")));
                lines.push(indent(&indent(&body)));
                lines.push(indent("END IF;"));
            }
            _ if !body.is_empty() => lines.push(indent(&body)),
            _ => {}
        }

        lines.push("END".to_string());
        vec![lines.join("\n")]
    }

    fn render_drop(&self, trigger: &TriggerDefinition) -> Vec<String> {
        vec![format!("DROP TRIGGER IF EXISTS {};", trigger.name())]
    }

    fn compile_group(&self, group: &TriggerGroup) -> TriggerResult<Vec<TriggerDefinition>> {
        if group.has_nested() {
            return Err(TriggerError::NestedGroup {
                engine: self.engine().to_string(),
                group: group.name(),
            });
        }

        let body = dispatch(&group.merge_branches()?);
        Ok(vec![group.physical(group.name(), None, group.all_declarations(), body)])
    }
}

/// `IF (a) THEN ... ELSEIF (b) THEN ... ELSE ... END IF;` over the branches.
/// An unconditional branch is `ELSE` when last and `TRUE` elsewhere.
fn dispatch(branches: &[MergeBranch]) -> Vec<String> {
    if let [only] = branches {
        if only.condition.is_none() {
            return only.body.clone();
        }
    }

    let mut lines = Vec::new();
    for (i, branch) in branches.iter().enumerate() {
        let is_last = i + 1 == branches.len();
        let condition = branch.condition.as_deref().unwrap_or("TRUE");
        let header = match (i, &branch.condition) {
            (0, _) => format!("IF ({condition}) THEN"),
            (_, None) if is_last => "ELSE".to_string(),
            _ => format!("ELSEIF ({condition}) THEN"),
        };
        lines.push(header);
        lines.extend(branch.body.iter().map(|statement| indent(statement)));
    }
    lines.push("END IF;".to_string());
    vec![lines.join("\n")]
}
