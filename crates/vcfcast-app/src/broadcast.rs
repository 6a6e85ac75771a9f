//! Rate-limited, fault-tolerant delivery loop.
//!
//! [`BroadcastEngine::run`] sends one message to each recipient in order
//! through a [`ReadyLink`]. A failed recipient is recorded and the loop moves
//! on. Consecutive sends are spaced by the configured courtesy delay, which
//! runs on the [`Environment`] clock so tests can use virtual time. A
//! terminal disconnect while delivering ends the run early with the tally so
//! far.
//!
//! # Invariants
//!
//! - `attempted == succeeded + failed` at every point of the loop.
//! - `failed_contacts` and `failure_reasons` have length `failed`, in
//!   recipient order.
//! - The link is closed before `run` returns, whatever the outcome.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vcfcast_core::{Contact, Environment};
use vcfcast_link::{Delivery, DisconnectReason, ReadyLink, TransportError};

use crate::{BroadcastConfig, SessionError};

/// Snapshot of a running broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastProgress {
    /// Recipients attempted so far.
    pub done: usize,
    /// Recipients in this run.
    pub total: usize,
    /// Successful sends so far.
    pub succeeded: usize,
    /// Failed sends so far.
    pub failed: usize,
}

impl BroadcastProgress {
    /// Completion in percent, rounded to the nearest integer.
    ///
    /// An empty run is complete.
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        (self.done * 100 + self.total / 2) / self.total
    }
}

/// Final tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Recipients a send was attempted for.
    pub attempted: usize,
    /// Successful sends.
    pub succeeded: usize,
    /// Failed sends.
    pub failed: usize,
    /// Recipients whose send failed, in delivery order.
    pub failed_contacts: Vec<Contact>,
    /// First line of each failure reason, parallel to `failed_contacts`.
    pub failure_reasons: Vec<String>,
}

impl BroadcastReport {
    /// Failed recipients paired with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&Contact, &str)> {
        self.failed_contacts.iter().zip(self.failure_reasons.iter().map(String::as_str))
    }

    fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, contact: Contact, reason: String) {
        self.attempted += 1;
        self.failed += 1;
        self.failed_contacts.push(contact);
        self.failure_reasons.push(reason);
    }

    fn progress(&self, total: usize) -> BroadcastProgress {
        BroadcastProgress {
            done: self.attempted,
            total,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Every recipient was attempted.
    Completed(BroadcastReport),
    /// The link terminated; the report covers the sends made before.
    LinkLost {
        /// Tally up to the disconnect.
        report: BroadcastReport,
        /// What the transport reported.
        reason: DisconnectReason,
    },
    /// Cancelled before the end; the partial tally is discarded.
    Cancelled {
        /// Recipients attempted before cancellation.
        attempted: usize,
    },
}

/// Delivery loop.
#[derive(Debug, Clone)]
pub struct BroadcastEngine<E: Environment> {
    env: E,
    config: BroadcastConfig,
}

impl<E: Environment> BroadcastEngine<E> {
    /// Create an engine.
    pub fn new(env: E, config: BroadcastConfig) -> Self {
        Self { env, config }
    }

    /// Deliver `message` to every contact in order.
    ///
    /// `progress` is called after every `progress_every`-th send and after
    /// the last one. An empty `contacts` yields an empty report without
    /// touching the link. The link is closed on return.
    pub async fn run(
        &self,
        contacts: &[Contact],
        message: &str,
        mut link: ReadyLink,
        progress: &mut (dyn FnMut(BroadcastProgress) + Send),
        cancel: &CancellationToken,
    ) -> BroadcastOutcome {
        let total = contacts.len();
        let every = self.config.progress_every.max(1);
        let identifier = link.identifier().clone();
        let mut report = BroadcastReport::default();

        tracing::info!(%identifier, total, "broadcast started");

        for (i, contact) in contacts.iter().enumerate() {
            if i > 0 && !self.config.send_delay.is_zero() {
                let paused = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Pause::Cancelled,
                    reason = link.terminated() => Pause::Terminated(reason),
                    () = self.env.sleep(self.config.send_delay) => Pause::Elapsed,
                };
                match paused {
                    Pause::Elapsed => {},
                    Pause::Cancelled => return cancelled(&mut link, &report),
                    Pause::Terminated(reason) => return lost(&mut link, report, reason),
                }
            }

            let delivery = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                delivery = link.send_watched(&contact.address, message) => Some(delivery),
            };

            match delivery {
                None => return cancelled(&mut link, &report),
                Some(Delivery::Terminated(reason)) => return lost(&mut link, report, reason),
                Some(Delivery::Sent) => report.record_success(),
                Some(Delivery::Failed(e)) => {
                    let reason = failure_reason(&e);
                    let failure = SessionError::SendFailure {
                        address: contact.address.clone(),
                        reason: reason.clone(),
                    };
                    tracing::warn!(%identifier, error = %failure, "recipient failed");
                    report.record_failure(contact.clone(), reason);
                },
            }

            let done = i + 1;
            if done % every == 0 || done == total {
                progress(report.progress(total));
            }
        }

        link.close();
        tracing::info!(
            %identifier,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "broadcast completed"
        );
        BroadcastOutcome::Completed(report)
    }
}

enum Pause {
    Elapsed,
    Cancelled,
    Terminated(DisconnectReason),
}

fn lost(
    link: &mut ReadyLink,
    report: BroadcastReport,
    reason: DisconnectReason,
) -> BroadcastOutcome {
    link.close();
    tracing::warn!(
        identifier = %link.identifier(),
        %reason,
        attempted = report.attempted,
        "link lost during broadcast"
    );
    BroadcastOutcome::LinkLost { report, reason }
}

fn cancelled(link: &mut ReadyLink, report: &BroadcastReport) -> BroadcastOutcome {
    link.close();
    tracing::info!(
        identifier = %link.identifier(),
        attempted = report.attempted,
        "broadcast cancelled, partial report discarded"
    );
    BroadcastOutcome::Cancelled { attempted: report.attempted }
}

/// First line of what the transport reported.
fn failure_reason(error: &TransportError) -> String {
    let full = match error {
        TransportError::Send(reason) => reason.clone(),
        other => other.to_string(),
    };
    full.lines().next().unwrap_or_default().trim().to_string()
}
