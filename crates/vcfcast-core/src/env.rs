//! Time and randomness seam.
//!
//! Send spacing, reconnect backoff and the connect and pairing bounds all wait
//! through [`Environment::sleep`], and pairing codes draw from
//! [`Environment::random_bytes`]. Production plugs in the OS clock and RNG;
//! simulation plugs in tokio's paused clock and a seeded stream, so a whole
//! broadcast replays identically in a test.

use std::time::Duration;

/// Clock, sleep and entropy for the link and delivery loops.
///
/// Implementations MUST guarantee:
///
/// - `now()` is monotonic
/// - `random_bytes()` draws from a cryptographic source in production, since
///   pairing codes are link credentials
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time on this environment's clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Wait for `duration` on this environment's clock.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Time passed since `start`.
    fn elapsed(&self, start: Self::Instant) -> Duration {
        self.now() - start
    }
}
