//! Type-safe session code.
//!
//! [`SessionCode`] is a 6-character code drawn from the uppercase
//! alphanumeric alphabet (`A–Z`, `0–9`), giving a 36^6 keyspace. Codes
//! are the public identity of a session: short enough to read out loud,
//! large enough that collisions are astronomically unlikely (but still
//! handled — see the registry's bounded retry loop).

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

/// Alphabet used for session codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed length of every session code.
pub const CODE_LENGTH: usize = 6;

/// Unique 6-character identifier for a session.
///
/// Constructed either by [`SessionCode::generate`] (server-side) or by
/// [`SessionCode::parse`] (validating client input). The inner string is
/// guaranteed to match `^[A-Z0-9]{6}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    /// Generates a random code from the 36-character alphabet.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..CODE_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..CODE_ALPHABET.len());
                // Index is always in range by construction.
                CODE_ALPHABET.get(idx).copied().unwrap_or(b'A') as char
            })
            .collect();
        Self(code)
    }

    /// Parses and validates a client-supplied code.
    ///
    /// Lowercase input is accepted and upcased, since codes are often
    /// typed by hand.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidCode`] if the input is not
    /// exactly 6 alphanumeric ASCII characters.
    pub fn parse(input: &str) -> Result<Self, CoordinatorError> {
        let upper = input.trim().to_ascii_uppercase();
        if upper.len() != CODE_LENGTH || !upper.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return Err(CoordinatorError::InvalidCode(input.to_string()));
        }
        Ok(Self(upper))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn generate_has_fixed_length_and_alphabet() {
        for _ in 0..100 {
            let code = SessionCode::generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn parse_accepts_valid_code() {
        let code = SessionCode::parse("Q7K2MD");
        assert!(code.is_ok());
    }

    #[test]
    fn parse_upcases_lowercase_input() {
        let Ok(code) = SessionCode::parse("q7k2md") else {
            panic!("lowercase code should parse");
        };
        assert_eq!(code.as_str(), "Q7K2MD");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(SessionCode::parse("ABC12").is_err());
        assert!(SessionCode::parse("ABC1234").is_err());
        assert!(SessionCode::parse("").is_err());
    }

    #[test]
    fn parse_rejects_non_alphanumeric() {
        assert!(SessionCode::parse("AB-12!").is_err());
        assert!(SessionCode::parse("ABC 12").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let code = SessionCode::generate();
        let json = serde_json::to_string(&code).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        let back: Option<SessionCode> = serde_json::from_str(&json).ok();
        assert_eq!(back, Some(code));
    }
}
