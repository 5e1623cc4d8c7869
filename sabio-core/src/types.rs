//! Identifier types shared across the registry and inference layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest accepted knowledge-base name.
pub const MAX_KB_NAME_LEN: usize = 64;

/// Validated knowledge-base name.
///
/// Names are non-empty, at most [`MAX_KB_NAME_LEN`] characters, and made of
/// letters (any script), digits, `_` or `-`, so they are safe as URL path
/// segments and directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KbName(String);

impl KbName {
    /// Validate and wrap a knowledge-base name.
    ///
    /// # Errors
    ///
    /// Returns [`KbNameError`] when the name is empty, too long, or contains
    /// characters outside the accepted set.
    pub fn new(value: impl Into<String>) -> Result<Self, KbNameError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KbNameError::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_KB_NAME_LEN {
            return Err(KbNameError::TooLong {
                len,
                max: MAX_KB_NAME_LEN,
            });
        }
        if let Some(ch) = trimmed
            .chars()
            .find(|ch| !(ch.is_alphanumeric() || *ch == '_' || *ch == '-'))
        {
            return Err(KbNameError::InvalidCharacter {
                name: trimmed.to_string(),
                ch,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KbName {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for KbName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KbName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KbName {
    type Error = KbNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for KbName {
    type Error = KbNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KbName> for String {
    fn from(value: KbName) -> Self {
        value.0
    }
}

/// Reasons a knowledge-base name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KbNameError {
    /// Blank names cannot be addressed.
    #[error(
        "Knowledge base name cannot be empty\n  Expected: 1-{MAX_KB_NAME_LEN} characters\n  Suggestion: Pick a short descriptive name such as 'medical_triage'"
    )]
    Empty,

    /// Name exceeds the length limit.
    #[error(
        "Knowledge base name is {len} characters long\n  Expected: at most {max} characters\n  Suggestion: Shorten the name"
    )]
    TooLong {
        /// Observed length in characters.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },

    /// Name contains a character outside letters, digits, `_` and `-`.
    #[error(
        "Knowledge base name '{name}' contains invalid character '{ch}'\n  Expected: letters, digits, '_' or '-'\n  Suggestion: Replace spaces and punctuation with '_'"
    )]
    InvalidCharacter {
        /// Offending name.
        name: String,
        /// First rejected character.
        ch: char,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unicode_letters() {
        let name = KbName::new("saúde_2").unwrap();
        assert_eq!(name.as_str(), "saúde_2");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(KbName::new("  gripe ").unwrap().as_str(), "gripe");
    }

    #[test]
    fn rejects_empty_and_invalid_names() {
        assert_eq!(KbName::new("   "), Err(KbNameError::Empty));
        assert!(matches!(
            KbName::new("a/b"),
            Err(KbNameError::InvalidCharacter { ch: '/', .. })
        ));
        assert!(matches!(
            KbName::new("x".repeat(65)),
            Err(KbNameError::TooLong { len: 65, .. })
        ));
    }

    #[test]
    fn serde_round_trips_through_string() {
        let json = serde_json::to_string(&KbName::new("clinic").unwrap()).unwrap();
        assert_eq!(json, "\"clinic\"");
        assert!(serde_json::from_str::<KbName>("\"bad name\"").is_err());
    }
}
