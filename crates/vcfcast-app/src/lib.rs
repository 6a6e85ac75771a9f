//! Broadcast sessions for vcfcast.
//!
//! Pure per-user state machine plus the async runtime around it, so session
//! logic is tested without I/O and the same code runs in production.
//!
//! # Components
//!
//! - [`Session`]: per-user state machine (front end events and run events in,
//!   [`SessionAction`]s out)
//! - [`BroadcastEngine`]: rate-limited delivery loop producing a
//!   [`BroadcastReport`]
//! - [`Coordinator`]: session store and per-user serialized workers
//! - [`Notification`] and [`StatusEvent`]: what the front end and the status
//!   viewer receive

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod broadcast;
mod config;
mod coordinator;
mod error;
mod event;
mod notification;
mod session;
mod state;

pub use action::{SessionAction, StatusEvent};
pub use broadcast::{BroadcastEngine, BroadcastOutcome, BroadcastProgress, BroadcastReport};
pub use config::{
    BroadcastConfig, CoordinatorConfig, DEFAULT_PROGRESS_EVERY, DEFAULT_QUEUE_DEPTH,
    DEFAULT_SEND_DELAY, DEFAULT_STATUS_CAPACITY,
};
pub use coordinator::{Coordinator, Outbound};
pub use error::{CoordinatorError, SessionError};
pub use event::{RunEvent, SessionEvent};
pub use notification::Notification;
pub use session::Session;
pub use state::{SessionPhase, SessionState};

/// Front end user identifier (a chat id).
pub type UserId = i64;
