use serde::{Deserialize, Serialize};

use crate::ddl::Engine;
use crate::error::{TriggerError, TriggerResult};

/// Compatibility version stamped on newly declared triggers.
/// Bump when any compiler changes its canonical rendering.
pub const CURRENT_COMPATIBILITY: u32 = 1;

/// Rendering rules used before conditions were parenthesised and
/// `EXECUTE FUNCTION` replaced `EXECUTE PROCEDURE`
pub const LEGACY_COMPATIBILITY: u32 = 0;

/// Maximum identifier length (PostgreSQL NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Hex digits of the condition hash appended to derived trigger names
pub const NAME_HASH_LENGTH: usize = 8;

/// Suggested migration names are cut to this many characters
pub const MAX_MIGRATION_NAME_LENGTH: usize = 120;

/// Settings for a migration-generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    /// Engine the migration is generated for
    pub engine: Engine,
    /// Drop generation warnings instead of logging them
    pub silence_warnings: bool,
    /// Compatibility version new declarations are stamped with
    pub compatibility: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            engine: Engine::FunctionBacked,
            silence_warnings: false,
            compatibility: CURRENT_COMPATIBILITY,
        }
    }
}

impl TriggerConfig {
    /// Load settings from JSON; missing keys fall back to defaults
    pub fn from_json(json: &str) -> TriggerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TriggerResult<()> {
        if self.compatibility > CURRENT_COMPATIBILITY {
            return Err(TriggerError::UnknownCompatibility {
                version: self.compatibility,
                current: CURRENT_COMPATIBILITY,
            });
        }
        Ok(())
    }
}
