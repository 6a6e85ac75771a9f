//! Canonical recipient addresses.
//!
//! Every phone-like value is reduced to digits with an optional leading `+`
//! before it is used for de-duplication, selection or delivery. Two raw
//! values that canonicalize to the same string are the same recipient.

use std::fmt;

use serde::Serialize;

use crate::error::AddressError;

/// Shortest canonical address accepted, counting a leading `+`.
pub const MIN_ADDRESS_LEN: usize = 8;

/// Canonical recipient identifier.
///
/// Holds only ASCII digits, optionally prefixed by a single `+`, and is at
/// least [`MIN_ADDRESS_LEN`] characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Canonicalize a raw phone-like value. `None` if the result is too short.
    ///
    /// A `+` survives only as the first non-whitespace character; every other
    /// non-digit is dropped.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_start();
        let mut canonical = String::with_capacity(trimmed.len());
        if trimmed.starts_with('+') {
            canonical.push('+');
        }
        canonical.extend(trimmed.chars().filter(char::is_ascii_digit));

        (canonical.len() >= MIN_ADDRESS_LEN).then_some(Self(canonical))
    }

    /// Validate a user-entered link identifier.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        Self::canonicalize(raw).ok_or_else(|| AddressError::InvalidIdentifier(raw.to_string()))
    }

    /// Canonical form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, without the leading `+`.
    pub fn digits(&self) -> &str {
        self.0.trim_start_matches('+')
    }

    /// Human-facing rendering.
    ///
    /// Ten-digit local numbers render as `(555) 123-4567`; anything else is
    /// shown in canonical form.
    pub fn display_local(&self) -> String {
        let s = self.0.as_str();
        if s.len() == 10 && !s.starts_with('+') {
            format!("({}) {}-{}", &s[..3], &s[3..6], &s[6..])
        } else {
            s.to_string()
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
