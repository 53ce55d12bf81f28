//! Lightweight engine: inline body, row level only, optional `WHEN`.
//! No security clauses and no function declarations.

use crate::ddl::{condition_clause, events_clause, indent, Capabilities, Engine, TriggerCompiler};
use crate::trigger::TriggerDefinition;

#[derive(Debug, Default, Clone, Copy)]
pub struct LightweightCompiler;

impl TriggerCompiler for LightweightCompiler {
    fn engine(&self) -> Engine {
        Engine::Lightweight
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            statement_level: false,
            multiple_events: false,
            truncate: false,
            row_level_truncate: false,
            update_columns: true,
            declarations: false,
            security_invoker: false,
            security_definer: false,
            security_principal: false,
            empty_body: false,
            conditional_empty_body: false,
            multiple_per_slot: true,
        }
    }

    fn render_create(&self, trigger: &TriggerDefinition) -> Vec<String> {
        let mut lines = vec![
            format!(
                "CREATE TRIGGER {} {} {} ON {}",
                trigger.name(),
                trigger.timing().as_sql(),
                events_clause(trigger),
                trigger.table(),
            ),
            format!("FOR EACH {}", trigger.granularity().as_sql()),
        ];
        if let Some(condition) = trigger.condition() {
            lines.push(format!("WHEN {}", condition_clause(condition, trigger.compatibility())));
        }
        lines.push("BEGIN".to_string());
        lines.extend(trigger.body().iter().map(|s| indent(s)));
        lines.push("END;".to_string());
        vec![lines.join("\n")]
    }

    fn render_drop(&self, trigger: &TriggerDefinition) -> Vec<String> {
        vec![format!("DROP TRIGGER IF EXISTS {};", trigger.name())]
    }
}
