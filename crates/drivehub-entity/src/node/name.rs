//! Node name rules.

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;

/// Longest accepted name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Trim and validate a display name.
///
/// Names are case preserving, must be non-empty, must not be `.` or `..`,
/// and must not contain `/` or NUL.
pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::invalid_operation("Name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(AppError::invalid_operation(format!(
            "'{name}' is not a valid name"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(AppError::invalid_operation(
            "Name must not contain '/' or NUL",
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::invalid_operation(format!(
            "Name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Key under which sibling names are compared.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}
