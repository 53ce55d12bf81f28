//! Generation warnings: valid but non-portable trigger features
//!
//! A warning never blocks generation. Warnings are handed to a [`WarningSink`];
//! the default [`TracingSink`] logs them unless warnings were silenced globally.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ddl::{Engine, Feature};

static WARNINGS_SILENCED: AtomicBool = AtomicBool::new(false);

/// Silence (or re-enable) warnings for every [`TracingSink`] in the process
pub fn set_warnings_silenced(silenced: bool) {
    WARNINGS_SILENCED.store(silenced, Ordering::Relaxed);
}

pub fn warnings_silenced() -> bool {
    WARNINGS_SILENCED.load(Ordering::Relaxed)
}

/// A feature the target engine accepts but at least one other engine rejects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationWarning {
    pub engine: Engine,
    pub trigger: String,
    pub feature: Feature,
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trigger '{}' uses {}, which {} supports but is not portable to {}",
            self.trigger,
            self.feature,
            self.engine,
            Engine::ALL
                .iter()
                .filter(|e| !e.capabilities().allows(self.feature))
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

pub trait WarningSink {
    fn warn(&self, warning: &GenerationWarning);
}

/// Logs warnings through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, warning: &GenerationWarning) {
        if warnings_silenced() {
            return;
        }
        tracing::warn!(
            engine = %warning.engine,
            trigger = %warning.trigger,
            "trigger_forge: {}",
            warning
        );
    }
}

/// Drops every warning
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl WarningSink for SilentSink {
    fn warn(&self, _warning: &GenerationWarning) {}
}

/// Keeps warnings in memory for later inspection
#[derive(Debug, Default)]
pub struct CollectingSink {
    warnings: RefCell<Vec<GenerationWarning>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<GenerationWarning> {
        self.warnings.borrow().clone()
    }

    pub fn take(&self) -> Vec<GenerationWarning> {
        self.warnings.take()
    }
}

impl WarningSink for CollectingSink {
    fn warn(&self, warning: &GenerationWarning) {
        self.warnings.borrow_mut().push(warning.clone());
    }
}
