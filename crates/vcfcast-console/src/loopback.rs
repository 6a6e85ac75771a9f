//! Loopback transport for dry runs.
//!
//! Nothing leaves the process: pairing is simulated by connecting a fixed
//! delay after the code was handed out, and deliveries are logged instead of
//! sent. Identifiers that paired once stay linked until their credentials
//! are purged, so a second broadcast connects without a new code.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use vcfcast_core::{Address, Environment, PairingCode};
use vcfcast_link::{Connection, Transport, TransportError, TransportHandle, TransportSignal};

/// Loopback behaviour.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Time between handing out a pairing code and reporting the link.
    pub pairing_delay: Duration,
    /// Fail every n-th send. `0` never fails.
    pub fail_every: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self { pairing_delay: Duration::from_secs(3), fail_every: 0 }
    }
}

struct Shared<E> {
    env: E,
    config: LoopbackConfig,
    linked: Mutex<HashSet<Address>>,
    sends: AtomicUsize,
}

impl<E> Shared<E> {
    fn linked(&self) -> MutexGuard<'_, HashSet<Address>> {
        self.linked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process transport that logs deliveries.
pub struct LoopbackTransport<E: Environment> {
    shared: Arc<Shared<E>>,
}

impl<E: Environment> LoopbackTransport<E> {
    /// Create a transport with no linked identifiers.
    pub fn new(env: E, config: LoopbackConfig) -> Self {
        let shared = Shared {
            env,
            config,
            linked: Mutex::new(HashSet::new()),
            sends: AtomicUsize::new(0),
        };
        Self { shared: Arc::new(shared) }
    }

    /// Whether `identifier` has paired and not been purged.
    pub fn is_linked(&self, identifier: &Address) -> bool {
        self.shared.linked().contains(identifier)
    }

    /// Sends attempted so far, failed ones included.
    pub fn send_count(&self) -> usize {
        self.shared.sends.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<E: Environment> Transport for LoopbackTransport<E> {
    async fn connect(&self, identifier: &Address) -> Result<Connection, TransportError> {
        let (signals, signals_rx) = mpsc::channel(4);
        let first = if self.is_linked(identifier) {
            TransportSignal::Connected
        } else {
            TransportSignal::PairingRequired
        };
        signals
            .try_send(first)
            .map_err(|_| TransportError::Unavailable("signal channel full".to_string()))?;

        tracing::info!(%identifier, "loopback connect");

        let handle = LoopbackHandle {
            shared: Arc::clone(&self.shared),
            identifier: identifier.clone(),
            signals: Some(signals),
        };
        Ok(Connection::new(Box::new(handle), signals_rx))
    }

    async fn purge_credentials(&self, identifier: &Address) -> Result<(), TransportError> {
        self.shared.linked().remove(identifier);
        tracing::info!(%identifier, "loopback credentials purged");
        Ok(())
    }
}

struct LoopbackHandle<E> {
    shared: Arc<Shared<E>>,
    identifier: Address,
    /// `None` once closed.
    signals: Option<mpsc::Sender<TransportSignal>>,
}

#[async_trait]
impl<E: Environment> TransportHandle for LoopbackHandle<E> {
    async fn request_pairing_code(&mut self) -> Result<String, TransportError> {
        let Some(signals) = self.signals.clone() else {
            return Err(TransportError::Closed);
        };

        let code = PairingCode::random(&self.shared.env);
        let shared = Arc::clone(&self.shared);
        let identifier = self.identifier.clone();
        tokio::spawn(async move {
            shared.env.sleep(shared.config.pairing_delay).await;
            shared.linked().insert(identifier);
            // Handle closed in the meantime.
            let _ = signals.send(TransportSignal::Connected).await;
        });

        Ok(code.as_str().to_string())
    }

    async fn send(&mut self, to: &Address, text: &str) -> Result<(), TransportError> {
        if self.signals.is_none() {
            return Err(TransportError::Closed);
        }

        let ordinal = self.shared.sends.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.shared.config.fail_every;
        if every > 0 && ordinal % every == 0 {
            return Err(TransportError::Send(format!("loopback dropped message {ordinal}")));
        }

        let chars = text.chars().count();
        tracing::info!(from = %self.identifier, %to, chars, "loopback delivery");
        Ok(())
    }

    fn close(&mut self) {
        if self.signals.take().is_some() {
            tracing::debug!(identifier = %self.identifier, "loopback handle closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use vcfcast_harness::SimEnv;

    use super::*;

    fn identifier() -> Address {
        Address::parse("+15550001111").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn pairs_then_stays_linked() {
        let transport = LoopbackTransport::new(SimEnv::new(), LoopbackConfig::default());

        let mut connection = transport.connect(&identifier()).await.unwrap();
        assert_eq!(connection.signals.recv().await, Some(TransportSignal::PairingRequired));

        let code = connection.handle.request_pairing_code().await.unwrap();
        assert!(PairingCode::parse(&code).is_ok());
        assert_eq!(connection.signals.recv().await, Some(TransportSignal::Connected));
        assert!(transport.is_linked(&identifier()));

        let mut again = transport.connect(&identifier()).await.unwrap();
        assert_eq!(again.signals.recv().await, Some(TransportSignal::Connected));
    }

    #[tokio::test]
    async fn purge_forgets_the_link() {
        let config = LoopbackConfig { pairing_delay: Duration::ZERO, fail_every: 0 };
        let transport = LoopbackTransport::new(SimEnv::new(), config);

        let mut connection = transport.connect(&identifier()).await.unwrap();
        connection.handle.request_pairing_code().await.unwrap();
        connection.signals.recv().await;
        connection.signals.recv().await;
        assert!(transport.is_linked(&identifier()));
        transport.purge_credentials(&identifier()).await.unwrap();

        assert!(!transport.is_linked(&identifier()));
    }

    #[tokio::test]
    async fn fails_every_nth_send() {
        let config = LoopbackConfig { pairing_delay: Duration::ZERO, fail_every: 3 };
        let transport = LoopbackTransport::new(SimEnv::new(), config);
        let mut connection = transport.connect(&identifier()).await.unwrap();
        let to = Address::parse("+447000000001").unwrap();

        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(connection.handle.send(&to, "hi").await.is_ok());
        }

        assert_eq!(results, [true, true, false, true, true, false]);
        assert_eq!(transport.send_count(), 6);
    }

    #[tokio::test]
    async fn closed_handle_refuses_sends() {
        let transport = LoopbackTransport::new(SimEnv::new(), LoopbackConfig::default());
        let mut connection = transport.connect(&identifier()).await.unwrap();

        connection.handle.close();
        connection.handle.close();

        let to = Address::parse("+447000000001").unwrap();
        assert_eq!(connection.handle.send(&to, "hi").await, Err(TransportError::Closed));
    }
}
