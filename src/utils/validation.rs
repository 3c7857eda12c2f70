//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for workspace and API key names: printable, no leading/trailing
/// whitespace enforced separately by length checks
static NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s](.*[^\s])?$").unwrap());

/// Regex for permission/scope tags of the form `<verb>:<resource>`
static SCOPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+:[a-z][a-z-]*$").unwrap());

/// Validate a workspace display name
pub fn validate_workspace_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 100 && NAME_REGEX.is_match(name)
}

/// Validate an API key name
pub fn validate_key_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 100 && NAME_REGEX.is_match(name)
}

/// Validate the shape of a scope tag (membership in the known scope set is
/// checked against the role table, not here)
pub fn validate_scope_shape(scope: &str) -> bool {
    scope.len() <= 64 && SCOPE_REGEX.is_match(scope)
}
