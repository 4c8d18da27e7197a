//! Validation helpers for DTOs.

use validator::ValidationError;

/// Largest accepted avatar payload, in bytes of data URL.
pub const MAX_AVATAR_BYTES: usize = 256 * 1024;

/// Rejects names made only of whitespace or containing control characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Display name must contain visible characters".into());
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("display_name_control");
        err.message = Some("Display name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that an avatar is an image data URL no larger than [`MAX_AVATAR_BYTES`].
///
/// ```ignore
/// validate_avatar("data:image/png;base64,iVBORw0...") // Ok
/// validate_avatar("https://example.com/me.png")       // Err - not a data URL
/// ```
pub fn validate_avatar(avatar: &str) -> Result<(), ValidationError> {
    if avatar.len() > MAX_AVATAR_BYTES {
        let mut err = ValidationError::new("avatar_size");
        err.message = Some(
            format!(
                "Avatar must be at most {MAX_AVATAR_BYTES} bytes (got {})",
                avatar.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !avatar.starts_with("data:image/") {
        let mut err = ValidationError::new("avatar_format");
        err.message = Some("Avatar must be an image data URL".into());
        return Err(err);
    }

    Ok(())
}

/// Rejects answers made only of whitespace.
pub fn validate_answer_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("answer_blank");
        err.message = Some("Answer must not be blank".into());
        return Err(err);
    }
    Ok(())
}
