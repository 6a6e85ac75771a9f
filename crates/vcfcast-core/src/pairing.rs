//! Pairing codes.
//!
//! The transport issues an eight-character alphanumeric code that the user
//! types into the phone app to authorize a new linked device. Codes are
//! stored uppercase without separators and rendered as `ABCD-EFGH`.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::{Environment, error::PairingCodeError};

/// Significant characters in a pairing code.
const CODE_LEN: usize = 8;

/// Alphabet used when generating codes; omits look-alike characters.
const ALPHABET: &[u8; 32] = b"123456789ABCDEFGHJKLMNPQRSTVWXYZ";

/// Short-lived link credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingCode(String);

impl PairingCode {
    /// Parse a code as issued by the transport.
    ///
    /// Hyphens and whitespace are ignored and letters are uppercased, so
    /// `abcd-1234` and `ABCD1234` are the same code.
    pub fn parse(raw: &str) -> Result<Self, PairingCodeError> {
        let mut code = String::with_capacity(CODE_LEN);
        for c in raw.chars().filter(|c| *c != '-' && !c.is_whitespace()) {
            if !c.is_ascii_alphanumeric() {
                return Err(PairingCodeError::InvalidCharacter(c));
            }
            code.push(c.to_ascii_uppercase());
        }

        if code.len() == CODE_LEN {
            Ok(Self(code))
        } else {
            Err(PairingCodeError::InvalidLength(code.len()))
        }
    }

    /// Generate a fresh code from the environment's RNG.
    pub fn random<E: Environment>(env: &E) -> Self {
        let mut bytes = [0u8; CODE_LEN];
        env.random_bytes(&mut bytes);
        let code =
            bytes.iter().map(|b| char::from(ALPHABET[usize::from(*b) % ALPHABET.len()])).collect();
        Self(code)
    }

    /// Code without separator.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.0.split_at(CODE_LEN / 2);
        write!(f, "{head}-{tail}")
    }
}

impl Serialize for PairingCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
