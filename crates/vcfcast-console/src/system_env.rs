//! Wall clock and OS entropy for the console binary.
//!
//! The courtesy delay between deliveries, reconnect backoff and the connect
//! and pairing bounds run on tokio's timer. Loopback pairing codes draw from
//! `getrandom`.

use std::time::Duration;

use vcfcast_core::Environment;

/// Real time and randomness.
///
/// # Panics
///
/// [`random_bytes`](Environment::random_bytes) panics if the OS has no
/// entropy to give. A pairing code must never come from a fallback source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Environment backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("OS entropy source unavailable");
    }
}

#[cfg(test)]
mod tests {
    use vcfcast_core::PairingCode;

    use super::*;

    #[test]
    fn two_pairing_codes_differ() {
        let env = SystemEnv::new();

        let first = PairingCode::random(&env);
        let second = PairingCode::random(&env);

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn send_delay_is_waited_out() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;

        assert!(env.elapsed(start) >= Duration::from_millis(20));
    }
}
