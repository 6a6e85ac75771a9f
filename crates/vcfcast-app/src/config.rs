//! Runtime configuration.

use std::time::Duration;

use vcfcast_link::LinkConfig;

/// Courtesy delay between two sends.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(1500);

/// A progress notification is emitted after this many sends.
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Per-user inbox depth before senders wait.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Status events buffered for slow status viewers.
pub const DEFAULT_STATUS_CAPACITY: usize = 64;

/// Delivery loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Delay between consecutive sends (not before the first).
    pub send_delay: Duration,
    /// Progress cadence; the final item always reports.
    pub progress_every: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { send_delay: DEFAULT_SEND_DELAY, progress_every: DEFAULT_PROGRESS_EVERY }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Delivery loop settings.
    pub broadcast: BroadcastConfig,
    /// Link timeouts and reconnect budget.
    pub link: LinkConfig,
    /// Per-user inbox depth.
    pub queue_depth: usize,
    /// Status feed buffer.
    pub status_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            link: LinkConfig::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            status_capacity: DEFAULT_STATUS_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Inbox depth, never zero.
    pub(crate) fn inbox_depth(&self) -> usize {
        self.queue_depth.max(1)
    }

    /// Status buffer, never zero.
    pub(crate) fn status_buffer(&self) -> usize {
        self.status_capacity.max(1)
    }
}
