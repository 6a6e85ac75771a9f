//! Error types for the core data model.

use thiserror::Error;

use crate::Address;

/// Errors raised while ingesting contacts or mutating a selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactError {
    /// Raw input could not be parsed at all.
    #[error("malformed contact file: {0}")]
    MalformedInput(String),

    /// Upload declared a content type that is not a contact card.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// One or more indices fall outside the contact set.
    #[error("invalid indices {indices:?} (contact set holds {len})")]
    IndexOutOfRange {
        /// Offending zero-based indices, in the order given.
        indices: Vec<usize>,
        /// Number of contacts in the set.
        len: usize,
    },

    /// Contact does not belong to the backing contact set.
    #[error("contact {0} is not part of the loaded contact set")]
    UnknownContact(Address),
}

/// Errors raised while validating an address-like value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Value does not canonicalize to a usable address.
    #[error("invalid identifier {0:?}: expected a phone number with at least 8 digits")]
    InvalidIdentifier(String),
}

/// Errors raised while parsing a pairing code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingCodeError {
    /// Code does not have exactly eight significant characters.
    #[error("pairing code must have 8 characters, got {0}")]
    InvalidLength(usize),

    /// Code contains a character outside `[A-Z0-9]`.
    #[error("pairing code contains invalid character {0:?}")]
    InvalidCharacter(char),
}
