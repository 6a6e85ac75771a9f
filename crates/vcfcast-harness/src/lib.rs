//! Deterministic simulation harness for vcfcast testing.
//!
//! Provides a seeded [`SimEnv`] running on tokio's virtual clock and a
//! [`ScriptedTransport`] whose connection signals and send failures are fixed
//! up front, so link, broadcast and session tests are reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod scripted_transport;
pub mod sim_env;

pub use fixtures::{alice_and_bob, vcard_file};
pub use scripted_transport::{
    AttemptScript, DEFAULT_PAIRING_CODE, FailurePlan, ScriptedTransport, SendRecord,
};
pub use sim_env::SimEnv;
