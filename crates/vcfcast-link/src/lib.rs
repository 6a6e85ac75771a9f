//! Messaging link lifecycle for vcfcast.
//!
//! The transport itself is a collaborator behind [`Transport`] and
//! [`TransportHandle`]. This crate owns what happens around it: the pairing
//! handshake, connection status, bounded reconnects and timeouts.
//!
//! # Architecture
//!
//! - [`LinkSession`]: pure state machine (signals in, [`LinkAction`]s out)
//! - [`establish`]: async driver executing those actions against a transport
//! - [`ReadyLink`]: the connected handle handed to the broadcast loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod session;
mod transport;

pub use driver::{Delivery, LinkObserver, LinkUpdate, ReadyLink, establish};
pub use error::{LinkError, LinkStage, TransportError};
pub use session::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECTS, DEFAULT_PAIRING_TIMEOUT,
    DEFAULT_RECONNECT_BACKOFF, LinkAction, LinkConfig, LinkSession, LinkStatus, MAX_RECONNECTS_CAP,
};
pub use transport::{Connection, DisconnectReason, Transport, TransportHandle, TransportSignal};
