//! Per-user session state.
//!
//! Each step of the workflow carries exactly the data it needs, so an event
//! that is invalid for the current step has nothing to act on and is rejected
//! structurally.

use std::fmt;

use serde::Serialize;
use vcfcast_core::{Address, Contact, SelectionTracker};

/// Session state with its payload.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// Waiting for a contact file.
    #[default]
    AwaitingContacts,

    /// Contacts loaded, user is picking recipients.
    SelectingRecipients {
        /// Selection over the uploaded contact set.
        selection: SelectionTracker,
    },

    /// Recipients confirmed, waiting for the message body.
    AwaitingMessage {
        /// Confirmed recipients in delivery order.
        recipients: Vec<Contact>,
    },

    /// Message stored, waiting for the sending account's identifier.
    AwaitingLinkIdentifier {
        /// Confirmed recipients in delivery order.
        recipients: Vec<Contact>,
        /// Message body.
        message: String,
    },

    /// Link attempt in flight.
    Linking {
        /// Run this attempt belongs to.
        run_id: u64,
        /// Sending account.
        identifier: Address,
        /// Confirmed recipients in delivery order.
        recipients: Vec<Contact>,
        /// Message body.
        message: String,
    },

    /// Delivery loop running.
    Broadcasting {
        /// Run being delivered.
        run_id: u64,
        /// Sending account.
        identifier: Address,
        /// Number of recipients.
        total: usize,
    },
}

impl SessionState {
    /// Payload-free tag of this state.
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::AwaitingContacts => SessionPhase::AwaitingContacts,
            Self::SelectingRecipients { .. } => SessionPhase::SelectingRecipients,
            Self::AwaitingMessage { .. } => SessionPhase::AwaitingMessage,
            Self::AwaitingLinkIdentifier { .. } => SessionPhase::AwaitingLinkIdentifier,
            Self::Linking { .. } => SessionPhase::Linking,
            Self::Broadcasting { .. } => SessionPhase::Broadcasting,
        }
    }

    /// Run owned by this state, if any.
    pub fn run_id(&self) -> Option<u64> {
        match self {
            Self::Linking { run_id, .. } | Self::Broadcasting { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}

/// Tag of a [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// See [`SessionState::AwaitingContacts`].
    AwaitingContacts,
    /// See [`SessionState::SelectingRecipients`].
    SelectingRecipients,
    /// See [`SessionState::AwaitingMessage`].
    AwaitingMessage,
    /// See [`SessionState::AwaitingLinkIdentifier`].
    AwaitingLinkIdentifier,
    /// See [`SessionState::Linking`].
    Linking,
    /// See [`SessionState::Broadcasting`].
    Broadcasting,
}

impl SessionPhase {
    /// True while a link or delivery run is in flight.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Linking | Self::Broadcasting)
    }

    /// What the user is expected to do next.
    pub fn hint(self) -> &'static str {
        match self {
            Self::AwaitingContacts => "please send a VCF contact file",
            Self::SelectingRecipients => {
                "please select recipients and confirm, or send their numbers like 1,3,5"
            },
            Self::AwaitingMessage => "please send the message to broadcast",
            Self::AwaitingLinkIdentifier => {
                "please send the phone number of the sending account, e.g. +15551234567"
            },
            Self::Linking | Self::Broadcasting => {
                "a broadcast is in progress, send /start to cancel"
            },
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingContacts => "awaiting contacts",
            Self::SelectingRecipients => "selecting recipients",
            Self::AwaitingMessage => "awaiting message",
            Self::AwaitingLinkIdentifier => "awaiting link identifier",
            Self::Linking => "linking",
            Self::Broadcasting => "broadcasting",
        };
        f.write_str(name)
    }
}
