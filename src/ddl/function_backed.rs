//! Function-backed engine: the body is wrapped in a named trigger function
//! and `CREATE TRIGGER` executes it.
//!
//! The function shares the trigger's name. Legacy compatibility renders
//! `EXECUTE PROCEDURE`; current renders `EXECUTE FUNCTION`.

use crate::config::LEGACY_COMPATIBILITY;
use crate::ddl::{events_clause, indent, Capabilities, Engine, TriggerCompiler};
use crate::trigger::{Event, Granularity, Security, Timing, TriggerDefinition};

#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionBackedCompiler;

impl TriggerCompiler for FunctionBackedCompiler {
    fn engine(&self) -> Engine {
        Engine::FunctionBacked
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            statement_level: true,
            multiple_events: true,
            truncate: true,
            row_level_truncate: false,
            update_columns: true,
            declarations: true,
            security_invoker: true,
            security_definer: true,
            security_principal: false,
            empty_body: true,
            conditional_empty_body: true,
            multiple_per_slot: true,
        }
    }

    fn render_create(&self, trigger: &TriggerDefinition) -> Vec<String> {
        vec![function_sql(trigger), trigger_sql(trigger)]
    }

    fn render_drop(&self, trigger: &TriggerDefinition) -> Vec<String> {
        vec![
            format!("DROP TRIGGER IF EXISTS {} ON {};", trigger.name(), trigger.table()),
            format!("DROP FUNCTION IF EXISTS {}();", trigger.name()),
        ]
    }
}

fn function_sql(trigger: &TriggerDefinition) -> String {
    let mut lines = vec![
        format!("CREATE OR REPLACE FUNCTION {}()", trigger.name()),
        "RETURNS TRIGGER".to_string(),
        "LANGUAGE plpgsql".to_string(),
    ];
    match trigger.security() {
        Some(Security::Definer) => lines.push("SECURITY DEFINER".to_string()),
        Some(Security::Invoker) => lines.push("SECURITY INVOKER".to_string()),
        // Rejected by supports()
        Some(Security::Principal(_)) | None => {}
    }
    lines.push("AS $$".to_string());

    if !trigger.declarations().is_empty() {
        lines.push("DECLARE".to_string());
        lines.extend(trigger.declarations().iter().map(|d| indent(d)));
    }

    lines.push("BEGIN".to_string());
    lines.extend(trigger.body().iter().map(|s| indent(s)));
    lines.extend(return_clause(trigger).iter().map(|s| indent(s)));
    lines.push("END;".to_string());
    lines.push("$$;".to_string());
    lines.join("\n")
}

fn trigger_sql(trigger: &TriggerDefinition) -> String {
    let mut sql = format!(
        "CREATE TRIGGER {} {} {} ON {}\nFOR EACH {}",
        trigger.name(),
        trigger.timing().as_sql(),
        events_clause(trigger),
        trigger.table(),
        trigger.granularity().as_sql(),
    );
    if let Some(condition) = trigger.condition() {
        sql.push_str(&format!("\nWHEN ({condition})"));
    }

    let execute = if trigger.compatibility() == LEGACY_COMPATIBILITY {
        "PROCEDURE"
    } else {
        "FUNCTION"
    };
    sql.push_str(&format!("\nEXECUTE {execute} {}();", trigger.name()));
    sql
}

/// BEFORE ROW triggers return the row to write; everything else returns NULL
fn return_clause(trigger: &TriggerDefinition) -> Vec<&'static str> {
    if trigger.timing() != Timing::Before || trigger.granularity() != Granularity::Row {
        return vec!["RETURN NULL;"];
    }

    if !trigger.reacts_to(Event::Delete) {
        vec!["RETURN NEW;"]
    } else if trigger.events().len() == 1 {
        vec!["RETURN OLD;"]
    } else {
        vec!["IF TG_OP = 'DELETE' THEN", "    RETURN OLD;", "END IF;", "RETURN NEW;"]
    }
}
