//! Session side-effects.
//!
//! [`SessionAction`]s are produced by the [`crate::Session`] state machine and
//! executed by the coordinator's per-user worker.

use serde::Serialize;
use vcfcast_core::{Address, Contact, PairingCode};
use vcfcast_link::LinkStatus;

use crate::{Notification, UserId};

/// Actions produced by the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Text for the chat front end.
    Notify(Notification),

    /// Event for the status viewer.
    Publish(StatusEvent),

    /// Start linking and, once connected, delivering.
    StartRun {
        /// Run identifier echoed back on every [`crate::RunEvent`].
        run_id: u64,
        /// Sending account.
        identifier: Address,
        /// Recipients in delivery order.
        recipients: Vec<Contact>,
        /// Message body.
        message: String,
    },

    /// Stop a run, releasing its transport handle.
    CancelRun {
        /// Run to stop.
        run_id: u64,
    },
}

/// Live status feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Link status changed.
    StatusChanged {
        /// User the link belongs to.
        user_id: UserId,
        /// New status.
        status: LinkStatus,
    },

    /// Pairing code ready to be entered on the phone.
    PairingCodeIssued {
        /// User the link belongs to.
        user_id: UserId,
        /// Code, serialized as `ABCD-EFGH`.
        code: PairingCode,
    },
}

impl StatusEvent {
    /// User this event belongs to.
    pub fn user_id(&self) -> UserId {
        match self {
            Self::StatusChanged { user_id, .. } | Self::PairingCodeIssued { user_id, .. } => {
                *user_id
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_wire_shape() {
        let changed =
            StatusEvent::StatusChanged { user_id: 7, status: LinkStatus::AwaitingPairing };
        let json = serde_json::to_string(&changed).unwrap();
        assert_eq!(json, r#"{"event":"status_changed","user_id":7,"status":"awaiting_pairing"}"#);

        let code = PairingCode::parse("K7QP4M2X").unwrap();
        let issued = StatusEvent::PairingCodeIssued { user_id: 7, code };
        let json = serde_json::to_string(&issued).unwrap();
        assert_eq!(json, r#"{"event":"pairing_code_issued","user_id":7,"code":"K7QP-4M2X"}"#);
        assert_eq!(issued.user_id(), 7);
    }
}
