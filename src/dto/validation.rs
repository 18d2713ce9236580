//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::registry::CODE_LENGTH;

/// Validates that a session code is exactly [`CODE_LENGTH`] alphanumeric
/// characters. Case is not checked here; lookups normalize to uppercase.
///
/// # Examples
///
/// ```ignore
/// validate_session_code("AB12CD") // Ok
/// validate_session_code("ab12cd") // Ok - normalized later
/// validate_session_code("AB12C")  // Err - too short
/// validate_session_code("AB-2CD") // Err - punctuation
/// ```
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != CODE_LENGTH {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "session code must be exactly {} characters (got {})",
                CODE_LENGTH,
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("session_code_format");
        err.message = Some("session code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Normalize a session code for lookup: trimmed and uppercased.
pub fn normalize_session_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
