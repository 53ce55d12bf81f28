use thiserror::Error;

pub mod testing;
pub mod warning;

pub use warning::{
    set_warnings_silenced, warnings_silenced, CollectingSink, GenerationWarning, SilentSink,
    TracingSink, WarningSink,
};

/// Broad classification of a [`TriggerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed declaration; halts the declaring unit only
    Declaration,
    /// Valid declaration the target engine cannot express; fatal to a generation run
    Generation,
    /// Dump or migration text could not be read or written
    Serialization,
    /// A DDL statement was rejected by an executor
    Execution,
}

/// Main error type for trigger declaration, compilation and migration generation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    // ============ Declaration Errors (42xxx) ============
    /// A required attribute was never configured
    #[error("Trigger declaration is missing required field '{field}'")]
    MissingField { field: &'static str },

    /// Timing value outside BEFORE/AFTER
    #[error("Invalid trigger timing '{value}' (expected before or after)")]
    InvalidTiming { value: String },

    /// Event value outside INSERT/UPDATE/DELETE/TRUNCATE
    #[error("Invalid trigger event '{value}' (expected insert, update, delete or truncate)")]
    InvalidEvent { value: String },

    /// Granularity value outside ROW/STATEMENT
    #[error("Invalid trigger granularity '{value}' (expected row or statement)")]
    InvalidGranularity { value: String },

    /// `events` was configured with an empty list
    #[error("Trigger on '{table}' must react to at least one event")]
    EmptyEvents { table: String },

    /// Identifier failed validation
    #[error("Invalid {parameter} '{value}': {reason}")]
    InvalidIdentifier {
        parameter: String,
        value: String,
        reason: String,
    },

    /// UPDATE OF columns given for a trigger that does not react to UPDATE
    #[error("Trigger '{trigger}' lists UPDATE OF columns but does not react to UPDATE")]
    ColumnsWithoutUpdate { trigger: String },

    /// Condition references a placeholder with no binding
    #[error("Unresolved placeholder '{{{placeholder}}}' in condition: {condition}")]
    UnresolvedPlaceholder {
        placeholder: String,
        condition: String,
    },

    /// Group member overrides an attribute shared by the whole group
    #[error("Group member of '{group}' may not change shared attribute '{field}'")]
    GroupMemberOverride { group: String, field: &'static str },

    /// Group member with neither statements nor nested members
    #[error("Group member of '{group}' has an empty body")]
    EmptyGroupMember { group: String },

    /// Compatibility version newer than this build knows how to render
    #[error("Unknown compatibility version {version} (newest supported is {current})")]
    UnknownCompatibility { version: u32, current: u32 },

    /// Two declared physical triggers share (table, name)
    #[error("Trigger '{name}' is declared more than once on '{table}'")]
    DuplicateName { table: String, name: String },

    /// A group parent was given its own statements
    #[error("Trigger group '{group}' cannot have a body; put statements in its branches")]
    BodyOnGroup { group: String },

    /// A group was built where a single trigger was expected
    #[error("Declaration '{name}' is a trigger group, not a single trigger")]
    NotASingleTrigger { name: String },

    // ============ Generation Errors (0A000 / 42P17) ============
    /// Feature requested that the target engine cannot express
    #[error("{engine} does not support {feature} (trigger '{trigger}')")]
    UnsupportedFeature {
        engine: String,
        feature: String,
        trigger: String,
    },

    /// Nested group on an engine that merges groups into one trigger
    #[error("{engine} cannot merge nested trigger groups (group '{group}')")]
    NestedGroup { engine: String, group: String },

    /// Two physical triggers on one (table, timing, event) for a single-slot engine
    #[error(
        "{engine} allows one trigger per table/timing/event; {slot} is used by {}; \
         declare them in one group",
        .triggers.join(", ")
    )]
    DuplicateSlot {
        engine: String,
        slot: String,
        triggers: Vec<String>,
    },

    // ============ Serialization Errors (22xxx) ============
    /// Dump text or migration payload could not be parsed or rendered
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // ============ Execution Errors (XX000) ============
    /// An executor refused a DDL statement
    #[error("Failed to execute DDL: {reason}\nStatement: {}", truncate_sql(.statement))]
    Execution { statement: String, reason: String },

    /// A migration older than the latest applied one was recorded
    #[error("Migration {version} is not newer than the latest applied migration {latest}")]
    OutOfOrderMigration { version: u64, latest: u64 },
}

fn truncate_sql(sql: &str) -> &str {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => &sql[..idx],
        None => sql,
    }
}

impl TriggerError {
    /// Classification used to decide how far an error propagates
    pub fn kind(&self) -> ErrorKind {
        use TriggerError::*;
        match self {
            MissingField { .. }
            | InvalidTiming { .. }
            | InvalidEvent { .. }
            | InvalidGranularity { .. }
            | EmptyEvents { .. }
            | InvalidIdentifier { .. }
            | ColumnsWithoutUpdate { .. }
            | UnresolvedPlaceholder { .. }
            | GroupMemberOverride { .. }
            | EmptyGroupMember { .. }
            | UnknownCompatibility { .. }
            | DuplicateName { .. }
            | BodyOnGroup { .. }
            | NotASingleTrigger { .. } => ErrorKind::Declaration,

            UnsupportedFeature { .. } | NestedGroup { .. } | DuplicateSlot { .. } => {
                ErrorKind::Generation
            }

            Serialization { .. } => ErrorKind::Serialization,
            Execution { .. } | OutOfOrderMigration { .. } => ErrorKind::Execution,
        }
    }

    /// Get PostgreSQL-style SQLSTATE code for this error
    pub fn sqlstate(&self) -> &'static str {
        use TriggerError::*;
        match self {
            MissingField { .. } => "42601",         // Syntax error
            InvalidTiming { .. } => "22023",        // Invalid parameter value
            InvalidEvent { .. } => "22023",
            InvalidGranularity { .. } => "22023",
            EmptyEvents { .. } => "42601",
            InvalidIdentifier { .. } => "42602",    // Invalid name
            ColumnsWithoutUpdate { .. } => "42P17", // Invalid object definition
            UnresolvedPlaceholder { .. } => "42704", // Undefined object
            GroupMemberOverride { .. } => "42P17",
            EmptyGroupMember { .. } => "42P17",
            UnknownCompatibility { .. } => "22023",
            DuplicateName { .. } => "42710",        // Duplicate object
            BodyOnGroup { .. } => "42P17",
            NotASingleTrigger { .. } => "42809",    // Wrong object type

            UnsupportedFeature { .. } => "0A000",   // Feature not supported
            NestedGroup { .. } => "0A000",
            DuplicateSlot { .. } => "42710",

            Serialization { .. } => "22P02",        // Invalid text representation
            Execution { .. } => "XX000",            // Internal error
            OutOfOrderMigration { .. } => "55000",  // Object not in prerequisite state
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.kind() == ErrorKind::Declaration
    }

    pub fn is_generation(&self) -> bool {
        self.kind() == ErrorKind::Generation
    }

    pub(crate) fn unsupported(
        engine: impl ToString,
        feature: impl ToString,
        trigger: &str,
    ) -> Self {
        TriggerError::UnsupportedFeature {
            engine: engine.to_string(),
            feature: feature.to_string(),
            trigger: trigger.to_string(),
        }
    }
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

impl From<serde_json::Error> for TriggerError {
    fn from(e: serde_json::Error) -> Self {
        TriggerError::Serialization {
            message: format!("JSON serialization error: {e}"),
        }
    }
}

impl From<regex::Error> for TriggerError {
    fn from(e: regex::Error) -> Self {
        TriggerError::Serialization {
            message: format!("Regex compilation failed: {e}"),
        }
    }
}
