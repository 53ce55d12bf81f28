//! trigger_forge: declare database triggers once, compile them for several
//! engines, and keep migrations and schema dumps in step with the declarations.
//!
//! ```rust
//! use trigger_forge::{generate_migration, Engine, Registry, TriggerBuilder};
//!
//! let mut registry = Registry::new();
//! registry.declare(
//!     TriggerBuilder::new()
//!         .on("users")
//!         .after(["insert"])
//!         .when("NEW.name = 'bob'")
//!         .body(["UPDATE groups SET bob_count = bob_count + 1"]),
//! )?;
//!
//! let plan = generate_migration(registry.all(), &[], Engine::FunctionBacked)?;
//! assert_eq!(plan.up.len(), 2);
//! assert_eq!(plan.down.len(), 2);
//! # Ok::<(), trigger_forge::TriggerError>(())
//! ```

pub mod builder;
pub mod config;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod group;
pub mod introspect;
pub mod migration;
pub mod registry;
pub mod schema;
pub mod trigger;
pub mod validation;

pub use builder::{Declaration, TriggerBuilder};
pub use config::TriggerConfig;
pub use ddl::{Engine, Feature, TriggerCompiler};
pub use diff::{
    diff_triggers, generate_migration, migrations_current, MigrationGenerator, TriggerDiff,
};
pub use error::{
    set_warnings_silenced, CollectingSink, ErrorKind, GenerationWarning, SilentSink, TracingSink,
    TriggerError, TriggerResult, WarningSink,
};
pub use group::TriggerGroup;
pub use introspect::{Executor, Introspect, MemoryDatabase, TriggerSnapshot};
pub use migration::{Migration, MigrationHistory, MigrationPlan, TriggerOperation};
pub use registry::Registry;
pub use schema::SchemaDumper;
pub use trigger::{Event, Granularity, Security, Timing, TriggerDefinition};

/// Version of the trigger_forge crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
