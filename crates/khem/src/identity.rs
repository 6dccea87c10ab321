//! The persisted user identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store key the identity is persisted under.
pub const USERNAME_KEY: &str = "username";

/// Why a name was rejected for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The name is empty once surrounding whitespace is removed.
    #[error("username is empty")]
    Empty,
}

/// Characters stripped from both ends of a name.
///
/// Unicode whitespace plus the byte order mark, but not NEL (U+0085): the
/// set an ECMAScript `String.prototype.trim` removes, so names typed on the
/// welcome screen validate the same way here.
fn is_blank(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// A user name that is valid for persistence.
///
/// The wrapped value is always trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate `input` and build an identity from its trimmed form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if `input` is empty or whitespace only.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim_matches(is_blank);
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The name as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identity, returning the name.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let identity = Identity::parse("  Khem Walker  ").unwrap();
        assert_eq!(identity.as_str(), "Khem Walker");
        assert_eq!(identity.to_string(), "Khem Walker");
    }

    #[test]
    fn test_parse_rejects_blank() {
        for input in ["", " ", "   ", "\t\n", "\u{3000}"] {
            assert_eq!(Identity::parse(input), Err(ValidationError::Empty));
        }
    }

    #[test]
    fn test_parse_strips_byte_order_mark() {
        assert_eq!(Identity::parse("\u{feff}"), Err(ValidationError::Empty));
        assert_eq!(Identity::parse(" \u{feff}\t"), Err(ValidationError::Empty));
        assert_eq!(
            Identity::parse("\u{feff}Rami\u{feff}").unwrap().as_str(),
            "Rami"
        );
    }

    #[test]
    fn test_parse_keeps_next_line() {
        assert_eq!(Identity::parse("\u{85}Rami").unwrap().as_str(), "\u{85}Rami");
        assert_eq!(Identity::parse("\u{85}").unwrap().as_str(), "\u{85}");
    }

    #[test]
    fn test_parse_keeps_inner_whitespace() {
        let identity = Identity::parse("\tRa  mi\n").unwrap();
        assert_eq!(identity.as_str(), "Ra  mi");
    }

    #[test]
    fn test_serde_transparent() {
        let identity = Identity::parse("Rami").unwrap();
        assert_eq!(serde_json::to_string(&identity).unwrap(), "\"Rami\"");

        let parsed: Identity = serde_json::from_str("\" Rami \"").unwrap();
        assert_eq!(parsed.as_str(), "Rami");

        assert!(serde_json::from_str::<Identity>("\"  \"").is_err());
    }

    #[test]
    fn test_into_inner() {
        let identity = Identity::parse("Rami").unwrap();
        assert_eq!(identity.into_inner(), "Rami");
    }
}
