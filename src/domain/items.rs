//! Item validation rules.

use super::entities::{ItemId, UserId};
use super::error::DomainError;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;

/// Trim and check a title, returning the normalized value.
///
/// Length is counted in characters, not bytes.
pub fn normalize_title(raw: &str) -> Result<String, DomainError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title", "title is required"));
    }

    let chars = title.chars().count();
    if chars < TITLE_MIN_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("title must be at least {TITLE_MIN_CHARS} characters"),
        ));
    }
    if chars > TITLE_MAX_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("title must be at most {TITLE_MAX_CHARS} characters"),
        ));
    }

    Ok(title.to_string())
}

pub fn ensure_user_id(user_id: UserId) -> Result<(), DomainError> {
    if user_id <= 0 {
        return Err(DomainError::validation(
            "user_id",
            "user id must be positive",
        ));
    }
    Ok(())
}

/// Non-positive ids can never exist in the store.
pub fn ensure_item_id(item_id: ItemId) -> Result<(), DomainError> {
    if item_id <= 0 {
        return Err(DomainError::not_found("item"));
    }
    Ok(())
}
