//! Async driver for [`LinkSession`].
//!
//! [`establish`] executes the state machine's actions against a
//! [`Transport`]: it opens connections, requests pairing codes, applies the
//! connect and pairing timeouts, sleeps through reconnect backoff and honours
//! cancellation at every await point. All waiting goes through the
//! [`Environment`], so simulations run it on virtual time.

use std::{collections::VecDeque, fmt, future::Future, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vcfcast_core::{Address, Environment, PairingCode};

use crate::{
    Connection, DisconnectReason, LinkAction, LinkConfig, LinkError, LinkSession, LinkStatus,
    Transport, TransportError, TransportHandle, TransportSignal,
};

/// Observable progress of a link attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpdate {
    /// Connection status changed.
    Status(LinkStatus),
    /// Pairing code is ready to show to the user.
    PairingCode(PairingCode),
    /// A transient disconnect triggered an automatic reconnect.
    Reconnecting {
        /// 1-based reconnect number
        attempt: u32,
    },
}

/// Receives [`LinkUpdate`]s in order.
pub trait LinkObserver: Send + Sync {
    /// Called for every update.
    fn observe(&self, update: LinkUpdate);
}

impl<T> LinkObserver for mpsc::UnboundedSender<T>
where
    T: From<LinkUpdate> + Send,
{
    fn observe(&self, update: LinkUpdate) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.send(T::from(update));
    }
}

/// Connected transport handle, ready for sending.
///
/// The connection's signal stream stays attached, so a logout while the link
/// is in use is still heard. Closing is idempotent and also happens on drop,
/// so the handle is released on every exit path.
pub struct ReadyLink {
    identifier: Address,
    handle: Option<Box<dyn TransportHandle>>,
    /// `None` once the transport stopped signalling.
    signals: Option<mpsc::Receiver<TransportSignal>>,
}

/// Result of [`ReadyLink::send_watched`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The transport accepted the message.
    Sent,
    /// This recipient failed; the link is still usable.
    Failed(TransportError),
    /// The link ended for good before the send completed.
    Terminated(DisconnectReason),
}

impl ReadyLink {
    /// Wrap an already connected handle and its signal stream.
    pub fn new(
        identifier: Address,
        handle: Box<dyn TransportHandle>,
        signals: mpsc::Receiver<TransportSignal>,
    ) -> Self {
        Self { identifier, handle: Some(handle), signals: Some(signals) }
    }

    /// Identifier this link belongs to.
    pub fn identifier(&self) -> &Address {
        &self.identifier
    }

    /// True until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Deliver `text` to one recipient unless the link terminates first.
    ///
    /// A terminal disconnect already queued wins over the send. After
    /// [`close`](Self::close) every send fails with `TransportError::Closed`.
    pub async fn send_watched(&mut self, to: &Address, text: &str) -> Delivery {
        let Some(handle) = self.handle.as_mut() else {
            return Delivery::Failed(TransportError::Closed);
        };

        tokio::select! {
            biased;
            reason = next_terminal(&self.identifier, &mut self.signals) => {
                Delivery::Terminated(reason)
            },
            sent = handle.send(to, text) => match sent {
                Ok(()) => Delivery::Sent,
                Err(e) => Delivery::Failed(e),
            },
        }
    }

    /// Resolve once the transport reports a terminal disconnect.
    ///
    /// Transient disconnects are logged and left to the transport to recover
    /// from. Never resolves if the signal stream has ended.
    pub async fn terminated(&mut self) -> DisconnectReason {
        next_terminal(&self.identifier, &mut self.signals).await
    }

    /// Release the transport handle.
    pub fn close(&mut self) {
        self.signals = None;
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            tracing::debug!(identifier = %self.identifier, "link closed");
        }
    }
}

async fn next_terminal(
    identifier: &Address,
    signals: &mut Option<mpsc::Receiver<TransportSignal>>,
) -> DisconnectReason {
    loop {
        let Some(receiver) = signals.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Some(TransportSignal::Disconnected(reason)) if reason.is_terminal() => {
                tracing::warn!(%identifier, %reason, "link terminated");
                return reason;
            },
            Some(TransportSignal::Disconnected(reason)) => {
                tracing::warn!(%identifier, %reason, "transient disconnect while linked");
            },
            Some(signal) => tracing::debug!(%identifier, ?signal, "signal while linked ignored"),
            None => *signals = None,
        }
    }
}

impl Drop for ReadyLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ReadyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyLink")
            .field("identifier", &self.identifier)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Outcome of a bounded, cancellable wait.
enum Bounded<T> {
    Done(T),
    Expired,
    Cancelled,
}

async fn bounded<E, F>(
    env: &E,
    budget: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Bounded<F::Output>
where
    E: Environment,
    F: Future,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Bounded::Cancelled,
        output = fut => Bounded::Done(output),
        () = env.sleep(budget) => Bounded::Expired,
    }
}

fn release(connection: &mut Option<Connection>) {
    if let Some(mut connection) = connection.take() {
        connection.handle.close();
    }
}

/// Drive a link for `identifier` until it is ready or has failed.
///
/// Updates are reported to `observer` as they happen. On success the
/// returned [`ReadyLink`] owns the connection; on every failure path the
/// connection has already been closed.
///
/// # Errors
///
/// - `LinkError::Timeout` if the connect or pairing wait expires
/// - `LinkError::Rejected` on a terminal disconnect (credentials purged)
/// - `LinkError::TransportUnavailable` if the transport cannot connect or pair
/// - `LinkError::RetriesExhausted` if transient disconnects outlast the budget
/// - `LinkError::Cancelled` if `cancel` fires
pub async fn establish<E: Environment>(
    transport: &dyn Transport,
    identifier: &Address,
    config: &LinkConfig,
    env: &E,
    observer: &dyn LinkObserver,
    cancel: &CancellationToken,
) -> Result<ReadyLink, LinkError> {
    let mut session = LinkSession::new(identifier.clone(), config.clone());
    let mut actions: VecDeque<LinkAction> = session.begin_attempt().into();
    let mut connection: Option<Connection> = None;
    let mut stage = session.stage();
    let mut stage_started = env.now();

    tracing::info!(%identifier, "link attempt started");

    loop {
        while let Some(action) = actions.pop_front() {
            let remaining = session.wait_budget().saturating_sub(env.elapsed(stage_started));

            match action {
                LinkAction::PublishStatus(status) => observer.observe(LinkUpdate::Status(status)),
                LinkAction::PublishPairingCode(code) => {
                    tracing::info!(%identifier, "pairing code issued");
                    observer.observe(LinkUpdate::PairingCode(code));
                },
                LinkAction::Connect => {
                    match bounded(env, remaining, cancel, transport.connect(identifier)).await {
                        Bounded::Done(Ok(opened)) => connection = Some(opened),
                        Bounded::Done(Err(e)) => {
                            tracing::warn!(%identifier, error = %e, "transport connect failed");
                            actions.extend(session.connect_failed(&e));
                        },
                        Bounded::Expired => {
                            actions.extend(session.timed_out(env.elapsed(stage_started)));
                        },
                        Bounded::Cancelled => return Err(LinkError::Cancelled),
                    }
                },
                LinkAction::RequestPairingCode => {
                    let Some(open) = connection.as_mut() else {
                        actions.extend(session.pairing_failed(&TransportError::Closed));
                        continue;
                    };
                    let requested =
                        bounded(env, remaining, cancel, open.handle.request_pairing_code()).await;
                    match requested {
                        Bounded::Done(Ok(raw)) => match PairingCode::parse(&raw) {
                            Ok(code) => actions.extend(session.pairing_code_issued(code)),
                            Err(e) => {
                                let error = TransportError::Pairing(e.to_string());
                                actions.extend(session.pairing_failed(&error));
                            },
                        },
                        Bounded::Done(Err(e)) => actions.extend(session.pairing_failed(&e)),
                        Bounded::Expired => {
                            actions.extend(session.timed_out(env.elapsed(stage_started)));
                        },
                        Bounded::Cancelled => {
                            release(&mut connection);
                            return Err(LinkError::Cancelled);
                        },
                    }
                },
                LinkAction::Ready => {
                    let Some(ready) = connection.take() else {
                        return Err(LinkError::TransportUnavailable(
                            "connected without a handle".to_string(),
                        ));
                    };
                    let reconnects = session.reconnects();
                    tracing::info!(%identifier, reconnects, "link connected");
                    return Ok(ReadyLink::new(identifier.clone(), ready.handle, ready.signals));
                },
                LinkAction::Reconnect { attempt, backoff } => {
                    release(&mut connection);
                    tracing::warn!(
                        %identifier,
                        attempt,
                        ?backoff,
                        "reconnecting after transient disconnect"
                    );
                    observer.observe(LinkUpdate::Reconnecting { attempt });

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(LinkError::Cancelled),
                        () = env.sleep(backoff) => {},
                    }

                    actions.extend(session.begin_attempt());
                    stage_started = env.now();
                },
                LinkAction::PurgeCredentials => {
                    if let Err(e) = transport.purge_credentials(identifier).await {
                        tracing::warn!(%identifier, error = %e, "failed to purge credentials");
                    }
                },
                LinkAction::Fail(error) => {
                    release(&mut connection);
                    tracing::warn!(%identifier, %error, "link failed");
                    return Err(error);
                },
            }

            if session.stage() != stage {
                stage = session.stage();
                stage_started = env.now();
            }
        }

        let Some(open) = connection.as_mut() else {
            return Err(LinkError::TransportUnavailable("no open connection".to_string()));
        };

        let remaining = session.wait_budget().saturating_sub(env.elapsed(stage_started));
        let next = bounded(env, remaining, cancel, open.signals.recv()).await;

        match next {
            Bounded::Done(signal) => {
                let signal = signal
                    .unwrap_or(TransportSignal::Disconnected(DisconnectReason::ConnectionLost));
                if let TransportSignal::Disconnected(reason) = &signal {
                    tracing::warn!(%identifier, %reason, "transport disconnected");
                }
                actions.extend(session.handle_signal(signal));
            },
            Bounded::Expired => actions.extend(session.timed_out(env.elapsed(stage_started))),
            Bounded::Cancelled => {
                release(&mut connection);
                tracing::info!(%identifier, "link attempt cancelled");
                return Err(LinkError::Cancelled);
            },
        }

        if session.stage() != stage {
            stage = session.stage();
            stage_started = env.now();
        }
    }
}
