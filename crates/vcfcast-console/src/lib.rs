//! Console front end for vcfcast.
//!
//! Production glue around [`vcfcast_app`]: a JSON-lines [`Console`] in place
//! of the chat front end, a [`LoopbackTransport`] in place of the messaging
//! network, and [`SystemEnv`] for real time and OS randomness.
//!
//! # Components
//!
//! - [`Console`]: reads [`Inbound`] commands and writes notifications and
//!   status events
//! - [`ContactFetcher`]: downloads contact files from pasted links
//! - [`LoopbackTransport`]: in-process transport that logs deliveries
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod console;
mod error;
mod fetch;
mod loopback;
mod system_env;

pub use command::{Command, Inbound};
pub use console::{Console, NotificationLine};
pub use error::ConsoleError;
pub use fetch::{
    ContactFetcher, DEFAULT_FETCH_TIMEOUT, FetchedFile, MAX_CONTACT_FILE_BYTES,
};
pub use loopback::{LoopbackConfig, LoopbackTransport};
pub use system_env::SystemEnv;
