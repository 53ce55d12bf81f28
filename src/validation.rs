//! Input Validation Module
//!
//! Identifiers end up interpolated into DDL verbatim, so trigger names, table
//! names and column names are checked before a declaration is frozen.
//!
//! ## Rules
//!
//! 1. **Whitelist, not blacklist**: only alphanumerics and underscores
//! 2. **Validate early**: builders validate on `build()`, never at compile time
//! 3. **Fail clearly**: every failure is a `DeclarationError` naming the parameter
//!
//! ## Usage
//!
//! ```rust
//! use trigger_forge::validation::{validate_sql_identifier, validate_table_name};
//!
//! validate_sql_identifier("users_after_insert_row_tr", "name").unwrap();
//! validate_table_name("public.users").unwrap();
//! assert!(validate_sql_identifier("users; DROP TABLE", "name").is_err());
//! ```

use crate::config::MAX_IDENTIFIER_LENGTH;
use crate::error::{TriggerError, TriggerResult};

/// Validate a bare SQL identifier (trigger, column or table segment)
///
/// Allows: ASCII alphanumerics + underscore, not starting with a digit,
/// at most 63 characters.
///
/// ```rust
/// use trigger_forge::validation::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("bob_count", "column").is_ok());
/// assert!(validate_sql_identifier("user-data", "table").is_err());   // dash
/// assert!(validate_sql_identifier("my table", "table").is_err());    // space
/// assert!(validate_sql_identifier("1st", "table").is_err());         // leading digit
/// ```
pub fn validate_sql_identifier(identifier: &str, param_name: &str) -> TriggerResult<()> {
    let Some(first) = identifier.chars().next() else {
        return Err(invalid(param_name, identifier, "Identifier cannot be empty"));
    };

    if !identifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            param_name,
            identifier,
            "Identifier must contain only alphanumeric characters and underscores",
        ));
    }

    // Unquoted identifiers can't start with a digit
    if first.is_ascii_digit() {
        return Err(invalid(param_name, identifier, "Identifier cannot start with a digit"));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(TriggerError::InvalidIdentifier {
            parameter: param_name.to_string(),
            value: format!("{}... ({} chars)", &identifier[..20], identifier.len()),
            reason: format!("Identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"),
        });
    }

    Ok(())
}

/// Validate a table name, optionally schema-qualified (`schema.table`)
pub fn validate_table_name(name: &str) -> TriggerResult<()> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 {
        return Err(invalid(
            "table",
            name,
            "Table name may have at most one schema qualifier",
        ));
    }

    for segment in segments {
        validate_sql_identifier(segment, "table").map_err(|_| {
            invalid(
                "table",
                name,
                "Each part of a table name must be a plain identifier",
            )
        })?;
    }

    Ok(())
}

/// Validate column name (alias for identifier)
pub fn validate_column_name(name: &str) -> TriggerResult<()> {
    validate_sql_identifier(name, "column")
}

fn invalid(param_name: &str, value: &str, reason: &str) -> TriggerError {
    TriggerError::InvalidIdentifier {
        parameter: param_name.to_string(),
        value: sanitize_for_logging(value),
        reason: reason.to_string(),
    }
}

/// Sanitize string for error messages (truncate, escape control chars)
pub(crate) fn sanitize_for_logging(s: &str) -> String {
    let max_len = 50;
    let truncated = match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    };

    truncated
        .replace('\0', "\\0")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
