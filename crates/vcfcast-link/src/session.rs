//! Link lifecycle state machine.
//!
//! Models one user's connection to the messaging transport across its
//! reconnect attempts. Uses the action pattern: every input returns the
//! actions the driver must perform, and the machine itself does no I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐ PairingRequired ┌─────────────────┐
//! │ Connecting │────────────────>│ AwaitingPairing │
//! └────────────┘                 └─────────────────┘
//!       │ Connected                      │ Connected
//!       ↓                                ↓
//! ┌───────────┐    Disconnected    ┌──────────────┐
//! │ Connected │───────────────────>│ Disconnected │
//! └───────────┘                    └──────────────┘
//! ```
//!
//! Every attempt ends in exactly one settled status. Signals arriving after
//! that are ignored. A transient disconnect starts a fresh attempt while the
//! reconnect budget lasts; a terminal one purges credentials and fails.

use std::time::Duration;

use serde::Serialize;
use vcfcast_core::{Address, PairingCode};

use crate::{DisconnectReason, LinkError, LinkStage, TransportError, TransportSignal};

/// Time allowed for the transport to connect or ask for pairing.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Time the user has to enter a pairing code.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(60);

/// Automatic reconnects after a transient disconnect.
pub const DEFAULT_MAX_RECONNECTS: u32 = 1;

/// Upper bound on automatic reconnects regardless of configuration.
pub const MAX_RECONNECTS_CAP: u32 = 3;

/// Base delay before a reconnect; multiplied by the attempt number.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Bound on the connect wait.
    pub connect_timeout: Duration,
    /// Bound on the pairing wait.
    pub pairing_timeout: Duration,
    /// Automatic reconnects (capped at [`MAX_RECONNECTS_CAP`]).
    pub max_reconnects: u32,
    /// Base reconnect delay.
    pub reconnect_backoff: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pairing_timeout: DEFAULT_PAIRING_TIMEOUT,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

impl LinkConfig {
    /// Reconnects actually allowed.
    pub fn reconnect_limit(&self) -> u32 {
        self.max_reconnects.min(MAX_RECONNECTS_CAP)
    }
}

/// Connection status as published to the status viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Attempt in progress.
    Connecting,
    /// Waiting for the user to enter a pairing code.
    AwaitingPairing,
    /// Ready to send.
    Connected,
    /// Attempt ended without a usable link.
    Disconnected,
}

/// Actions returned by the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Open a new transport connection.
    Connect,
    /// Ask the open connection for a pairing code.
    RequestPairingCode,
    /// Tell observers about a status change.
    PublishStatus(LinkStatus),
    /// Tell observers about a fresh pairing code.
    PublishPairingCode(PairingCode),
    /// Link is usable; hand it off.
    Ready,
    /// Close the current connection and start a new attempt after `backoff`.
    Reconnect {
        /// 1-based reconnect number
        attempt: u32,
        /// Delay before connecting again
        backoff: Duration,
    },
    /// Forget stored credentials for the identifier.
    PurgeCredentials,
    /// Close the current connection and give up.
    Fail(LinkError),
}

/// Link lifecycle for one identifier.
#[derive(Debug, Clone)]
pub struct LinkSession {
    identifier: Address,
    config: LinkConfig,
    status: LinkStatus,
    pairing_code: Option<PairingCode>,
    /// Reconnects performed so far.
    reconnects: u32,
    /// A settled status was acted upon for the current attempt.
    settled: bool,
}

impl LinkSession {
    /// New session in [`LinkStatus::Connecting`]. Call
    /// [`begin_attempt`](Self::begin_attempt) to get the first actions.
    pub fn new(identifier: Address, config: LinkConfig) -> Self {
        Self {
            identifier,
            config,
            status: LinkStatus::Connecting,
            pairing_code: None,
            reconnects: 0,
            settled: false,
        }
    }

    /// Identifier being linked.
    pub fn identifier(&self) -> &Address {
        &self.identifier
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Pairing code of the current attempt, if one was issued.
    pub fn pairing_code(&self) -> Option<&PairingCode> {
        self.pairing_code.as_ref()
    }

    /// Reconnects performed so far.
    #[must_use]
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// True once the current attempt reached a settled outcome.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Wait currently in progress.
    #[must_use]
    pub fn stage(&self) -> LinkStage {
        match self.status {
            LinkStatus::AwaitingPairing => LinkStage::Pairing,
            _ => LinkStage::Connect,
        }
    }

    /// Bound on the wait currently in progress.
    #[must_use]
    pub fn wait_budget(&self) -> Duration {
        match self.stage() {
            LinkStage::Connect => self.config.connect_timeout,
            LinkStage::Pairing => self.config.pairing_timeout,
        }
    }

    /// Start a fresh attempt. Any previous pairing code is discarded.
    pub fn begin_attempt(&mut self) -> Vec<LinkAction> {
        self.status = LinkStatus::Connecting;
        self.pairing_code = None;
        self.settled = false;

        vec![LinkAction::PublishStatus(LinkStatus::Connecting), LinkAction::Connect]
    }

    /// Process a transport signal.
    pub fn handle_signal(&mut self, signal: TransportSignal) -> Vec<LinkAction> {
        if self.settled {
            tracing::debug!(identifier = %self.identifier, ?signal, "ignoring signal after settle");
            return vec![];
        }

        match signal {
            TransportSignal::PairingRequired => {
                if self.status != LinkStatus::Connecting {
                    return vec![];
                }
                self.status = LinkStatus::AwaitingPairing;
                vec![
                    LinkAction::PublishStatus(LinkStatus::AwaitingPairing),
                    LinkAction::RequestPairingCode,
                ]
            },
            TransportSignal::Connected => {
                self.settle(LinkStatus::Connected);
                vec![LinkAction::PublishStatus(LinkStatus::Connected), LinkAction::Ready]
            },
            TransportSignal::Disconnected(reason) => self.disconnected(reason),
        }
    }

    /// Record a pairing code returned by the transport.
    pub fn pairing_code_issued(&mut self, code: PairingCode) -> Vec<LinkAction> {
        if self.settled || self.status != LinkStatus::AwaitingPairing {
            return vec![];
        }
        self.pairing_code = Some(code.clone());
        vec![LinkAction::PublishPairingCode(code)]
    }

    /// The transport could not produce a pairing code.
    pub fn pairing_failed(&mut self, error: &TransportError) -> Vec<LinkAction> {
        self.fail(LinkError::TransportUnavailable(error.to_string()))
    }

    /// The transport could not open a connection.
    pub fn connect_failed(&mut self, error: &TransportError) -> Vec<LinkAction> {
        self.fail(LinkError::TransportUnavailable(error.to_string()))
    }

    /// The current wait exceeded its budget. Timeouts are not retried.
    pub fn timed_out(&mut self, elapsed: Duration) -> Vec<LinkAction> {
        let stage = self.stage();
        self.fail(LinkError::Timeout { stage, elapsed })
    }

    fn disconnected(&mut self, reason: DisconnectReason) -> Vec<LinkAction> {
        self.settle(LinkStatus::Disconnected);
        let mut actions = vec![LinkAction::PublishStatus(LinkStatus::Disconnected)];

        if reason.is_terminal() {
            actions.push(LinkAction::PurgeCredentials);
            actions.push(LinkAction::Fail(LinkError::Rejected(reason)));
        } else if self.reconnects < self.config.reconnect_limit() {
            self.reconnects += 1;
            actions.push(LinkAction::Reconnect {
                attempt: self.reconnects,
                backoff: self.config.reconnect_backoff * self.reconnects,
            });
        } else {
            actions.push(LinkAction::Fail(LinkError::RetriesExhausted {
                attempts: self.reconnects + 1,
                last: reason,
            }));
        }

        actions
    }

    fn fail(&mut self, error: LinkError) -> Vec<LinkAction> {
        if self.settled {
            return vec![];
        }
        self.settle(LinkStatus::Disconnected);
        vec![LinkAction::PublishStatus(LinkStatus::Disconnected), LinkAction::Fail(error)]
    }

    fn settle(&mut self, status: LinkStatus) {
        self.status = status;
        self.settled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(max_reconnects: u32) -> LinkSession {
        let config = LinkConfig { max_reconnects, ..LinkConfig::default() };
        let mut session = LinkSession::new(Address::parse("+15550001111").unwrap(), config);
        session.begin_attempt();
        session
    }

    #[test]
    fn pairing_then_connected() {
        let mut link = session(1);

        let actions = link.handle_signal(TransportSignal::PairingRequired);
        assert_eq!(actions, vec![
            LinkAction::PublishStatus(LinkStatus::AwaitingPairing),
            LinkAction::RequestPairingCode,
        ]);
        assert_eq!(link.stage(), LinkStage::Pairing);
        assert_eq!(link.wait_budget(), DEFAULT_PAIRING_TIMEOUT);

        let code = PairingCode::parse("ABCD1234").unwrap();
        assert_eq!(link.pairing_code_issued(code.clone()), vec![LinkAction::PublishPairingCode(
            code.clone()
        )]);
        assert_eq!(link.pairing_code(), Some(&code));

        let actions = link.handle_signal(TransportSignal::Connected);
        assert_eq!(actions, vec![
            LinkAction::PublishStatus(LinkStatus::Connected),
            LinkAction::Ready
        ]);
        assert_eq!(link.status(), LinkStatus::Connected);
    }

    #[test]
    fn signals_after_settle_are_ignored() {
        let mut link = session(1);
        link.handle_signal(TransportSignal::Connected);

        assert!(link.handle_signal(TransportSignal::Connected).is_empty());
        assert!(
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::LoggedOut))
                .is_empty()
        );
        assert!(link.timed_out(Duration::from_secs(99)).is_empty());
        assert_eq!(link.status(), LinkStatus::Connected);
    }

    #[test]
    fn logged_out_purges_and_fails() {
        let mut link = session(3);

        let actions =
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::LoggedOut));
        assert_eq!(actions, vec![
            LinkAction::PublishStatus(LinkStatus::Disconnected),
            LinkAction::PurgeCredentials,
            LinkAction::Fail(LinkError::Rejected(DisconnectReason::LoggedOut)),
        ]);
    }

    #[test]
    fn transient_disconnect_reconnects_with_growing_backoff() {
        let mut link = session(2);

        let actions =
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::ConnectionLost));
        assert_eq!(actions[1], LinkAction::Reconnect {
            attempt: 1,
            backoff: DEFAULT_RECONNECT_BACKOFF
        });

        assert_eq!(link.begin_attempt()[1], LinkAction::Connect);
        assert!(link.pairing_code().is_none());

        let actions =
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::RestartRequired));
        assert_eq!(actions[1], LinkAction::Reconnect {
            attempt: 2,
            backoff: DEFAULT_RECONNECT_BACKOFF * 2
        });

        link.begin_attempt();
        let actions =
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::ConnectionLost));
        assert_eq!(
            actions[1],
            LinkAction::Fail(LinkError::RetriesExhausted {
                attempts: 3,
                last: DisconnectReason::ConnectionLost,
            })
        );
    }

    #[test]
    fn reconnect_budget_is_capped() {
        let config = LinkConfig { max_reconnects: 50, ..LinkConfig::default() };
        assert_eq!(config.reconnect_limit(), MAX_RECONNECTS_CAP);

        let mut link = session(50);
        let mut reconnects = 0;
        while matches!(
            link.handle_signal(TransportSignal::Disconnected(DisconnectReason::ConnectionLost))[1],
            LinkAction::Reconnect { .. }
        ) {
            reconnects += 1;
            link.begin_attempt();
        }
        assert_eq!(reconnects, MAX_RECONNECTS_CAP);
    }

    #[test]
    fn timeout_reports_stage() {
        let mut link = session(1);
        link.handle_signal(TransportSignal::PairingRequired);

        let actions = link.timed_out(Duration::from_secs(61));
        assert_eq!(
            actions[1],
            LinkAction::Fail(LinkError::Timeout {
                stage: LinkStage::Pairing,
                elapsed: Duration::from_secs(61),
            })
        );
        assert_eq!(link.status(), LinkStatus::Disconnected);
    }

    #[test]
    fn pairing_code_outside_pairing_is_ignored() {
        let mut link = session(1);
        let code = PairingCode::parse("ABCD1234").unwrap();

        assert!(link.pairing_code_issued(code).is_empty());
        assert!(link.pairing_code().is_none());
    }
}
