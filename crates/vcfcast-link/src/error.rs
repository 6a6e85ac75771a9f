//! Error types for the link layer.
//!
//! Transport errors describe what the collaborator reported; link errors
//! describe why a whole link attempt was abandoned.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::DisconnectReason;

/// Failures reported by the transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Transport could not be initialized
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Handle was already closed
    #[error("transport handle closed")]
    Closed,

    /// A single delivery failed
    #[error("send failed: {0}")]
    Send(String),

    /// Pairing code could not be obtained
    #[error("pairing failed: {0}")]
    Pairing(String),
}

/// Which wait ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStage {
    /// Waiting for the transport to connect or ask for pairing.
    Connect,
    /// Waiting for the user to enter the pairing code.
    Pairing,
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Pairing => f.write_str("pairing"),
        }
    }
}

/// Why a link could not be established.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Connect or pairing wait exceeded its bound
    #[error("{stage} wait timed out after {elapsed:?}")]
    Timeout {
        /// Wait that expired
        stage: LinkStage,
        /// Time spent in that wait
        elapsed: Duration,
    },

    /// Terminal rejection; stored credentials were purged
    #[error("link rejected: {0}")]
    Rejected(DisconnectReason),

    /// Transport failed to initialize or pair
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Transient disconnects exceeded the reconnect budget
    #[error("link dropped {attempts} times, last reason: {last}")]
    RetriesExhausted {
        /// Connection attempts made
        attempts: u32,
        /// Reason of the final disconnect
        last: DisconnectReason,
    },

    /// Caller cancelled the attempt
    #[error("link attempt cancelled")]
    Cancelled,
}
