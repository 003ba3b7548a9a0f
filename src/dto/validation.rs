//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates an event or court identifier: 1 to 64 characters of `[A-Za-z0-9_-]`.
///
/// Identifiers end up in storage paths and document ids, so anything else is refused.
///
/// ```ignore
/// validate_identifier("spring-cup_2025") // Ok
/// validate_identifier("../etc")          // Err - forbidden characters
/// validate_identifier("")                // Err - empty
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "identifier must be 1 to {MAX_IDENTIFIER_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("identifier may only contain letters, digits, `-` and `_`".into());
        return Err(err);
    }

    Ok(())
}
