//! Schema Canonicalizer: the live trigger set as stable, portable text
//!
//! Each live trigger is either rendered symbolically, as the declaration that
//! produced it, or as raw engine-native DDL when no known generated trigger
//! compiles to the same DDL under the same name.
//!
//! ## Key Components
//!
//! - `SchemaDumper`: renders a snapshot, given history / known declarations
//! - `parser::parse_dump()`: reads a previous dump back
//! - `normalize_ddl()`: whitespace- and terminator-insensitive DDL comparison key
//!
//! ## Guarantees
//!
//! Entries are sorted by trigger name. Dumping again with the previous output
//! and no declaration changes returns the same text byte for byte.
//!
//! ## Example
//!
//! ```rust
//! use trigger_forge::schema::SchemaDumper;
//! use trigger_forge::{Engine, Executor, MemoryDatabase, TriggerBuilder};
//!
//! let trigger = TriggerBuilder::new()
//!     .name("bob_tr")
//!     .on("users")
//!     .after(["insert"])
//!     .generated(true)
//!     .body(["UPDATE groups SET bob_count = bob_count + 1"])
//!     .build_trigger()?;
//!
//! let mut db = MemoryDatabase::new();
//! for statement in Engine::Lightweight.compile_create(&trigger)? {
//!     db.execute(&statement)?;
//! }
//!
//! let dumper = SchemaDumper::new(Engine::Lightweight).with_known([trigger]);
//! let dump = dumper.dump_from(&db, None)?;
//! assert!(dump.contains("create_trigger {\"name\":\"bob_tr\""));
//! assert_eq!(dumper.dump_from(&db, Some(dump.as_str()))?, dump);
//! # Ok::<(), trigger_forge::TriggerError>(())
//! ```

pub mod parser;

use tracing::info;

use crate::ddl::Engine;
use crate::error::TriggerResult;
use crate::introspect::{Introspect, TriggerSnapshot};
use crate::migration::MigrationHistory;
use crate::trigger::TriggerDefinition;

use parser::{parse_dump, HEADER, MANUAL_PREFIX, SYMBOLIC_PREFIX, VERSION_PREFIX};

pub struct SchemaDumper<'a> {
    engine: Engine,
    history: Option<&'a MigrationHistory>,
    known: Vec<TriggerDefinition>,
}

impl<'a> SchemaDumper<'a> {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            history: None,
            known: Vec::new(),
        }
    }

    /// Use recorded migrations for provenance and the version header
    #[must_use]
    pub fn with_history(mut self, history: &'a MigrationHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Extra generated triggers to recognise (e.g. the current declarations)
    #[must_use]
    pub fn with_known<I>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = TriggerDefinition>,
    {
        self.known.extend(triggers);
        self
    }

    pub fn dump_from(
        &self,
        source: &dyn Introspect,
        previous: Option<&str>,
    ) -> TriggerResult<String> {
        self.dump(&source.snapshot()?, previous)
    }

    pub fn dump(
        &self,
        snapshot: &TriggerSnapshot,
        previous: Option<&str>,
    ) -> TriggerResult<String> {
        let previous = previous.map(parse_dump).transpose()?;

        // Provenance order: migration history, then known, then the previous dump
        let candidates: Vec<TriggerDefinition> = self
            .history
            .map(MigrationHistory::recorded_triggers)
            .unwrap_or_default()
            .into_iter()
            .chain(self.known.iter().cloned())
            .chain(previous.iter().flat_map(|p| p.triggers.iter().cloned()))
            .filter(TriggerDefinition::is_generated)
            .collect();

        let version = match self.history {
            Some(history) => history.latest_version().unwrap_or(0),
            None => previous.as_ref().and_then(|p| p.version).unwrap_or(0),
        };

        let mut entries = Vec::with_capacity(snapshot.len());
        let mut symbolic = 0;
        for (name, ddl) in snapshot {
            let live = normalize_ddl(ddl);
            let known = candidates.iter().find(|c| {
                c.name() == name.as_str() && normalize_ddl(&self.engine.signature(c)) == live
            });
            match known {
                Some(trigger) => {
                    symbolic += 1;
                    entries.push(format!("{SYMBOLIC_PREFIX}{}", serde_json::to_string(trigger)?));
                }
                None => entries.push(format!("{MANUAL_PREFIX} {name}\n{}", raw_block(ddl))),
            }
        }

        info!(
            engine = %self.engine,
            version,
            symbolic,
            raw = entries.len() - symbolic,
            "dumped trigger schema"
        );

        let mut out = format!("{HEADER}\n{VERSION_PREFIX} {version}\n");
        for entry in entries {
            out.push('\n');
            out.push_str(&entry);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Comparison key for DDL: whitespace collapsed, trailing terminators dropped
pub fn normalize_ddl(ddl: &str) -> String {
    let collapsed = ddl.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim_end().to_string()
}

/// Raw DDL without trailing spaces or blank lines, so entries stay separable
fn raw_block(ddl: &str) -> String {
    ddl.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
