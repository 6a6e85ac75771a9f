//! Scripted transport for deterministic link and broadcast tests.
//!
//! Each `connect` consumes the next [`AttemptScript`] (or the fallback once
//! the queue is empty) and replays its signals on the connection's channel.
//! Sends are recorded and fail according to a [`FailurePlan`]. Clones share
//! state, so a test keeps one clone for assertions and hands the other to the
//! code under test.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use vcfcast_core::Address;
use vcfcast_link::{
    Connection, DisconnectReason, Transport, TransportError, TransportHandle, TransportSignal,
};

/// Code handed out when a script does not name one.
pub const DEFAULT_PAIRING_CODE: &str = "K7QP4M2X";

/// Signals and pairing behaviour for one connection attempt.
#[derive(Debug, Clone)]
pub struct AttemptScript {
    on_connect: Vec<TransportSignal>,
    after_pairing: Vec<TransportSignal>,
    /// Signals emitted once the handle has made that many sends.
    after_sends: Vec<(usize, TransportSignal)>,
    pairing: Result<String, TransportError>,
}

impl Default for AttemptScript {
    fn default() -> Self {
        Self {
            on_connect: Vec::new(),
            after_pairing: Vec::new(),
            after_sends: Vec::new(),
            pairing: Ok(DEFAULT_PAIRING_CODE.to_string()),
        }
    }
}

impl AttemptScript {
    /// Stored credentials are valid: connects immediately.
    pub fn already_linked() -> Self {
        Self { on_connect: vec![TransportSignal::Connected], ..Self::default() }
    }

    /// Asks for pairing, then connects once a code was requested.
    pub fn pairing_then_connected() -> Self {
        Self {
            on_connect: vec![TransportSignal::PairingRequired],
            after_pairing: vec![TransportSignal::Connected],
            ..Self::default()
        }
    }

    /// Asks for pairing and the user never enters the code.
    pub fn pairing_never_completes() -> Self {
        Self { on_connect: vec![TransportSignal::PairingRequired], ..Self::default() }
    }

    /// Drops the connection right away.
    pub fn disconnects(reason: DisconnectReason) -> Self {
        Self { on_connect: vec![TransportSignal::Disconnected(reason)], ..Self::default() }
    }

    /// Never emits anything.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Append a signal emitted on connect.
    #[must_use]
    pub fn then(mut self, signal: TransportSignal) -> Self {
        self.on_connect.push(signal);
        self
    }

    /// Emit `signal` right after the `sends`-th send on this connection.
    #[must_use]
    pub fn then_after_sends(mut self, sends: usize, signal: TransportSignal) -> Self {
        self.after_sends.push((sends, signal));
        self
    }

    /// Use a specific raw pairing code.
    #[must_use]
    pub fn with_pairing_code(mut self, code: impl Into<String>) -> Self {
        self.pairing = Ok(code.into());
        self
    }

    /// Make the pairing code request fail.
    #[must_use]
    pub fn with_pairing_error(mut self, error: TransportError) -> Self {
        self.pairing = Err(error);
        self
    }
}

/// Which sends fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FailurePlan {
    /// Every send succeeds.
    #[default]
    None,
    /// The n-th, 2n-th, ... send (1-based, across the transport) fails.
    EveryNth(usize),
    /// Sends to these addresses fail.
    Addresses(HashSet<Address>),
}

impl FailurePlan {
    fn fails(&self, ordinal: usize, to: &Address) -> bool {
        match self {
            Self::None => false,
            Self::EveryNth(n) => *n > 0 && ordinal % n == 0,
            Self::Addresses(addresses) => addresses.contains(to),
        }
    }
}

/// One recorded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    /// Recipient.
    pub to: Address,
    /// Message body.
    pub text: String,
    /// Whether the transport reported success.
    pub delivered: bool,
}

#[derive(Debug, Default)]
struct State {
    attempts: VecDeque<AttemptScript>,
    fallback: AttemptScript,
    unavailable: Option<String>,
    failures: FailurePlan,
    send_latency: Duration,
    connects: Vec<Address>,
    sends: Vec<SendRecord>,
    pairing_requests: usize,
    closes: usize,
    open_handles: usize,
    peak_open_handles: usize,
    purged: Vec<Address>,
}

/// Transport whose behaviour is fixed up front.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    /// Transport that connects immediately on every attempt.
    pub fn already_linked() -> Self {
        Self::with_fallback(AttemptScript::already_linked())
    }

    /// Transport that requires pairing on every attempt.
    pub fn pairing_then_connected() -> Self {
        Self::with_fallback(AttemptScript::pairing_then_connected())
    }

    /// Transport that replays `script` on every attempt not queued explicitly.
    pub fn with_fallback(script: AttemptScript) -> Self {
        let transport = Self::default();
        transport.lock().fallback = script;
        transport
    }

    /// Transport that refuses to connect at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let transport = Self::default();
        transport.lock().unavailable = Some(reason.into());
        transport
    }

    /// Queue a script for the next unscripted attempt.
    #[must_use]
    pub fn then_attempt(self, script: AttemptScript) -> Self {
        self.lock().attempts.push_back(script);
        self
    }

    /// Set which sends fail.
    #[must_use]
    pub fn failing(self, plan: FailurePlan) -> Self {
        self.lock().failures = plan;
        self
    }

    /// Delay every send by `latency`.
    #[must_use]
    pub fn with_send_latency(self, latency: Duration) -> Self {
        self.lock().send_latency = latency;
        self
    }

    /// All sends in order.
    pub fn sends(&self) -> Vec<SendRecord> {
        self.lock().sends.clone()
    }

    /// Recipients of successful sends in order.
    pub fn delivered(&self) -> Vec<Address> {
        self.lock().sends.iter().filter(|s| s.delivered).map(|s| s.to.clone()).collect()
    }

    /// Number of `connect` calls.
    pub fn connects(&self) -> usize {
        self.lock().connects.len()
    }

    /// Number of pairing code requests.
    pub fn pairing_requests(&self) -> usize {
        self.lock().pairing_requests
    }

    /// Number of handles closed.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Most handles ever open at the same time.
    pub fn peak_open_handles(&self) -> usize {
        self.lock().peak_open_handles
    }

    /// Identifiers whose credentials were purged.
    pub fn purged(&self) -> Vec<Address> {
        self.lock().purged.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, identifier: &Address) -> Result<Connection, TransportError> {
        let script = {
            let mut state = self.lock();
            if let Some(reason) = &state.unavailable {
                return Err(TransportError::Unavailable(reason.clone()));
            }
            state.connects.push(identifier.clone());
            state.open_handles += 1;
            state.peak_open_handles = state.peak_open_handles.max(state.open_handles);
            match state.attempts.pop_front() {
                Some(script) => script,
                None => state.fallback.clone(),
            }
        };

        let (tx, rx) = mpsc::channel(16);
        for signal in script.on_connect {
            let _ = tx.try_send(signal);
        }

        tracing::debug!(%identifier, "scripted connect");

        let handle = ScriptedHandle {
            state: Arc::clone(&self.state),
            signals: Some(tx),
            after_pairing: script.after_pairing,
            after_sends: script.after_sends,
            sent: 0,
            pairing: script.pairing,
        };
        Ok(Connection::new(Box::new(handle), rx))
    }

    async fn purge_credentials(&self, identifier: &Address) -> Result<(), TransportError> {
        self.lock().purged.push(identifier.clone());
        Ok(())
    }
}

struct ScriptedHandle {
    state: Arc<Mutex<State>>,
    /// `None` once closed.
    signals: Option<mpsc::Sender<TransportSignal>>,
    after_pairing: Vec<TransportSignal>,
    after_sends: Vec<(usize, TransportSignal)>,
    /// Sends made through this handle.
    sent: usize,
    pairing: Result<String, TransportError>,
}

#[async_trait]
impl TransportHandle for ScriptedHandle {
    async fn request_pairing_code(&mut self) -> Result<String, TransportError> {
        let Some(signals) = &self.signals else {
            return Err(TransportError::Closed);
        };
        lock(&self.state).pairing_requests += 1;

        for signal in self.after_pairing.drain(..) {
            let _ = signals.try_send(signal);
        }
        self.pairing.clone()
    }

    async fn send(&mut self, to: &Address, text: &str) -> Result<(), TransportError> {
        if self.signals.is_none() {
            return Err(TransportError::Closed);
        }

        let latency = lock(&self.state).send_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let delivered = {
            let mut state = lock(&self.state);
            let ordinal = state.sends.len() + 1;
            let delivered = !state.failures.fails(ordinal, to);
            state.sends.push(SendRecord { to: to.clone(), text: text.to_string(), delivered });
            delivered
        };

        self.sent += 1;
        if let Some(signals) = &self.signals {
            for (_, signal) in self.after_sends.iter().filter(|(after, _)| *after == self.sent) {
                let _ = signals.try_send(signal.clone());
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(TransportError::Send(format!("recipient {to} unreachable\nretry later")))
        }
    }

    fn close(&mut self) {
        if self.signals.take().is_some() {
            let mut state = lock(&self.state);
            state.closes += 1;
            state.open_handles = state.open_handles.saturating_sub(1);
        }
    }
}
