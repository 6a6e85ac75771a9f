//! Session input events.
//!
//! Two sources drive a [`crate::Session`]:
//! - [`SessionEvent`]s from the chat front end, one per user interaction.
//! - [`RunEvent`]s from the link and delivery task of the current run.

use vcfcast_link::{DisconnectReason, LinkError, LinkUpdate};

use crate::{BroadcastProgress, BroadcastReport};

/// Front end events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Contact file uploaded.
    ContactFileReceived {
        /// Raw file content.
        bytes: Vec<u8>,
        /// MIME type declared by the front end, if any.
        mime_type: Option<String>,
    },

    /// Flip one contact (zero-based index into the loaded contacts).
    ToggleContact(usize),

    /// Select every loaded contact.
    SelectAll,

    /// Deselect everything.
    ClearAll,

    /// Confirm the current selection.
    ConfirmSelection,

    /// Replace the selection with these zero-based indices and confirm it.
    RecipientsSelected(Vec<usize>),

    /// Message body entered.
    MessageEntered(String),

    /// Phone number of the sending account entered.
    LinkIdentifierEntered(String),

    /// Start over (`/start`), cancelling any run in flight.
    RestartSession,
}

impl SessionEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContactFileReceived { .. } => "contact_file_received",
            Self::ToggleContact(_) => "toggle_contact",
            Self::SelectAll => "select_all",
            Self::ClearAll => "clear_all",
            Self::ConfirmSelection => "confirm_selection",
            Self::RecipientsSelected(_) => "recipients_selected",
            Self::MessageEntered(_) => "message_entered",
            Self::LinkIdentifierEntered(_) => "link_identifier_entered",
            Self::RestartSession => "restart_session",
        }
    }
}

/// Events reported by a running link and delivery task.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Link progress.
    Link(LinkUpdate),

    /// Link connected, delivery starting.
    LinkReady,

    /// Link could not be established.
    LinkFailed(LinkError),

    /// Delivery progress.
    Progress(BroadcastProgress),

    /// Delivery finished.
    Finished(BroadcastReport),

    /// Link terminated during delivery; credentials were already purged.
    LinkLost {
        /// Tally up to the disconnect.
        report: BroadcastReport,
        /// What the transport reported.
        reason: DisconnectReason,
    },
}

impl RunEvent {
    /// True for the last event a run reports.
    pub fn ends_run(&self) -> bool {
        matches!(self, Self::LinkFailed(_) | Self::Finished(_) | Self::LinkLost { .. })
    }
}

impl From<LinkUpdate> for RunEvent {
    fn from(update: LinkUpdate) -> Self {
        Self::Link(update)
    }
}
