//! Username validation
//!
//! Rules, checked in order (first failure wins):
//! 1. non-empty
//! 2. one letter followed by 3-10 word characters
//! 3. not already registered (case-sensitive)

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AdmissionError;
use crate::registry::Registry;

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,10}$").expect("username pattern is valid")
});

/// Check the username grammar in isolation
pub fn is_valid_username(username: &str) -> bool {
    USERNAME.is_match(username)
}

/// Validate a candidate username against the registry
///
/// Must run in the same step as the insert that follows it, otherwise
/// two joins with the same name can both pass.
pub fn validate_username(username: &str, registry: &Registry) -> Result<(), AdmissionError> {
    if username.is_empty() {
        return Err(AdmissionError::MissingUsername);
    }
    if !is_valid_username(username) {
        return Err(AdmissionError::InvalidUsername);
    }
    if registry.contains(username) {
        return Err(AdmissionError::UsernameTaken);
    }
    Ok(())
}
