//! Core data model for vcfcast.
//!
//! Pure types with no I/O: everything here can be driven from tests and
//! simulation exactly as it is driven in production.
//!
//! # Components
//!
//! - [`Address`]: canonical recipient identifier (digits, optional leading `+`)
//! - [`ContactSet`]: de-duplicated, ordered recipient directory
//! - [`SelectionTracker`]: per-session set of chosen recipients
//! - [`PairingCode`]: short-lived link credential issued by the transport
//! - [`ContactParser`]: seam for the contact-file parser collaborator
//! - [`Environment`]: time, sleeping and randomness

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod contact;
pub mod env;
mod error;
mod pairing;
mod parser;
mod selection;

pub use address::{Address, MIN_ADDRESS_LEN};
pub use contact::{Contact, ContactSet, IngestSummary, ParsedEntry};
pub use env::Environment;
pub use error::{AddressError, ContactError, PairingCodeError};
pub use pairing::PairingCode;
pub use parser::{CardReader, ContactParser, decode_upload};
pub use selection::{SelectionTracker, ToggleOutcome};
