//! Messaging transport collaborator.
//!
//! The transport owns the real end-to-end encrypted protocol. The link layer
//! only sees an opaque handle plus an ordered channel of connection signals,
//! so the pairing handshake can be driven the same way against a production
//! transport, a loopback, or a scripted simulation.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use vcfcast_core::Address;

use crate::TransportError;

/// Why the transport dropped a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Credentials were invalidated on the phone. Terminal.
    LoggedOut,
    /// Network fault.
    ConnectionLost,
    /// Transport asked for a fresh handshake.
    RestartRequired,
    /// Transport-side timeout.
    Timeout,
    /// Anything else the transport reported.
    Closed(String),
}

impl DisconnectReason {
    /// Terminal reasons abandon the link and purge stored credentials.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::RestartRequired => f.write_str("restart required"),
            Self::Timeout => f.write_str("timeout"),
            Self::Closed(reason) => write!(f, "closed: {reason}"),
        }
    }
}

/// Connection-state signal emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// No stored credentials; a pairing code must be requested.
    PairingRequired,
    /// Link is usable.
    Connected,
    /// Link dropped.
    Disconnected(DisconnectReason),
}

/// One connection attempt: the handle plus its signal stream.
///
/// A closed signal channel is treated as `Disconnected(ConnectionLost)`.
pub struct Connection {
    /// Handle used for pairing and sending.
    pub handle: Box<dyn TransportHandle>,
    /// Ordered connection signals.
    pub signals: mpsc::Receiver<TransportSignal>,
}

impl Connection {
    /// Bundle a handle with its signal receiver.
    pub fn new(handle: Box<dyn TransportHandle>, signals: mpsc::Receiver<TransportSignal>) -> Self {
        Self { handle, signals }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Factory for connections to the messaging service.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Begin a connection for `identifier`.
    ///
    /// The returned connection emits its first signal asynchronously.
    ///
    /// # Errors
    ///
    /// - `TransportError::Unavailable` if the transport cannot start at all
    async fn connect(&self, identifier: &Address) -> Result<Connection, TransportError>;

    /// Forget any stored credentials for `identifier`.
    async fn purge_credentials(&self, identifier: &Address) -> Result<(), TransportError>;
}

/// Live handle to one connection.
#[async_trait]
pub trait TransportHandle: Send {
    /// Ask the service for a pairing code.
    async fn request_pairing_code(&mut self) -> Result<String, TransportError>;

    /// Deliver `text` to one recipient.
    async fn send(&mut self, to: &Address, text: &str) -> Result<(), TransportError>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}
