//! Session and coordinator errors.
//!
//! Every session-level failure is reported to the user and leaves the session
//! in a state from which the user can continue. Per-recipient send failures
//! never abort a broadcast; they only end up in the report.

use std::time::Duration;

use thiserror::Error;
use vcfcast_core::{Address, AddressError, ContactError};
use vcfcast_link::{LinkError, LinkStage};

use crate::{SessionPhase, UserId};

/// Session-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Contact file could not be read
    #[error("malformed contact file: {0}")]
    MalformedInput(String),

    /// Selection confirmed with no recipients
    #[error("no recipients selected")]
    EmptySelection,

    /// Link identifier is not address-like
    #[error("invalid link identifier {0:?}")]
    InvalidIdentifier(String),

    /// Recipient indices outside the contact list
    #[error("recipient indices {indices:?} outside 0..{len}")]
    InvalidSelection {
        /// Offending zero-based indices
        indices: Vec<usize>,
        /// Number of contacts
        len: usize,
    },

    /// Connect or pairing wait expired
    #[error("{stage} wait timed out after {elapsed:?}")]
    LinkTimeout {
        /// Wait that expired
        stage: LinkStage,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// Terminal rejection from the transport
    #[error("link rejected: {0}")]
    LinkRejected(String),

    /// Link ended for good while delivering
    #[error("link lost during broadcast: {0}")]
    LinkLost(String),

    /// One recipient could not be reached
    #[error("send to {address} failed: {reason}")]
    SendFailure {
        /// Recipient
        address: Address,
        /// First line of the transport's reason
        reason: String,
    },

    /// Transport could not be used at all
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Event not valid for the current step
    #[error("event not valid while {phase}")]
    OutOfStep {
        /// Phase the session was in
        phase: SessionPhase,
    },
}

impl SessionError {
    /// True if the session stayed on the same step and the user can simply
    /// resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput(_)
                | Self::EmptySelection
                | Self::InvalidIdentifier(_)
                | Self::InvalidSelection { .. }
                | Self::LinkTimeout { .. }
                | Self::OutOfStep { .. }
        )
    }
}

impl From<ContactError> for SessionError {
    fn from(error: ContactError) -> Self {
        match error {
            ContactError::MalformedInput(reason) => Self::MalformedInput(reason),
            ContactError::UnsupportedFileType(mime) => {
                Self::MalformedInput(format!("unsupported file type {mime}"))
            },
            ContactError::IndexOutOfRange { indices, len } => {
                Self::InvalidSelection { indices, len }
            },
            ContactError::UnknownContact(address) => {
                Self::MalformedInput(format!("{address} is not in the uploaded contacts"))
            },
        }
    }
}

impl From<AddressError> for SessionError {
    fn from(error: AddressError) -> Self {
        match error {
            AddressError::InvalidIdentifier(raw) => Self::InvalidIdentifier(raw),
        }
    }
}

impl From<LinkError> for SessionError {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::Timeout { stage, elapsed } => Self::LinkTimeout { stage, elapsed },
            LinkError::Rejected(reason) => Self::LinkRejected(reason.to_string()),
            LinkError::TransportUnavailable(reason) => Self::TransportUnavailable(reason),
            LinkError::RetriesExhausted { .. } | LinkError::Cancelled => {
                Self::TransportUnavailable(error.to_string())
            },
        }
    }
}

/// Coordinator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The user's worker stopped and no longer accepts events
    #[error("session worker for user {0} is gone")]
    WorkerGone(UserId),
}

#[cfg(test)]
mod tests {
    use vcfcast_link::DisconnectReason;

    use super::*;

    #[test]
    fn link_errors_map_to_session_kinds() {
        let timeout = LinkError::Timeout { stage: LinkStage::Pairing, elapsed: Duration::ZERO };
        assert!(matches!(SessionError::from(timeout), SessionError::LinkTimeout { .. }));

        let rejected = SessionError::from(LinkError::Rejected(DisconnectReason::LoggedOut));
        assert_eq!(rejected, SessionError::LinkRejected("logged out".into()));
        assert!(!rejected.is_retryable());

        let exhausted = SessionError::from(LinkError::RetriesExhausted {
            attempts: 2,
            last: DisconnectReason::ConnectionLost,
        });
        assert!(matches!(exhausted, SessionError::TransportUnavailable(_)));
    }

    #[test]
    fn contact_errors_map_to_input_kinds() {
        let err = SessionError::from(ContactError::UnsupportedFileType("image/png".into()));
        assert!(matches!(err, SessionError::MalformedInput(_)));
        assert!(err.is_retryable());

        let err = SessionError::from(ContactError::IndexOutOfRange { indices: vec![4], len: 2 });
        assert_eq!(err, SessionError::InvalidSelection { indices: vec![4], len: 2 });
    }
}
