//! Session store and per-user workers.
//!
//! The [`Coordinator`] is the only entry point for front end events. It keeps
//! one worker task per user; the worker owns that user's [`Session`] and
//! processes envelopes strictly one at a time, so events for one user are
//! serialized while different users proceed in parallel.
//!
//! A worker also owns the user's current run: the task that establishes the
//! link and runs the [`BroadcastEngine`]. A cancelled run is joined by its
//! successor before the successor connects, so one user never holds two
//! transport handles at once. Run progress flows back to the
//! worker over a channel and through [`Session::handle_run`]; notifications
//! it produces go to the outbound channel returned by [`Coordinator::new`].
//!
//! ```text
//! front end ──handle_event──▶ inbox ──▶ worker (Session) ──▶ reply
//!                                          ▲      │
//!                              RunEvents   │      ├──▶ outbound notifications
//!                                          │      └──▶ status feed
//!                                  run task (establish + BroadcastEngine)
//! ```

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{RwLock, broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use vcfcast_core::{Address, Contact, ContactParser, Environment};
use vcfcast_link::{LinkError, Transport, establish};

use crate::{
    BroadcastEngine, BroadcastOutcome, CoordinatorConfig, CoordinatorError, Notification, RunEvent,
    Session, SessionAction, SessionEvent, SessionPhase, StatusEvent, UserId,
};

/// How long a new run waits for the cancelled one to release its link.
const RUN_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Notification produced outside a direct reply (link and delivery progress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient user.
    pub user_id: UserId,
    /// What to tell them.
    pub notification: Notification,
}

enum Envelope {
    Event { event: SessionEvent, reply: oneshot::Sender<Vec<Notification>> },
    Phase { reply: oneshot::Sender<SessionPhase> },
}

struct Shared<E: Environment> {
    env: E,
    transport: Arc<dyn Transport>,
    parser: Arc<dyn ContactParser>,
    config: CoordinatorConfig,
    outbound: mpsc::UnboundedSender<Outbound>,
    status: broadcast::Sender<StatusEvent>,
}

/// Routes events to per-user sessions.
///
/// Cheap to clone; clones share the session store.
pub struct Coordinator<E: Environment> {
    shared: Arc<Shared<E>>,
    sessions: Arc<RwLock<HashMap<UserId, mpsc::Sender<Envelope>>>>,
}

impl<E: Environment> Clone for Coordinator<E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), sessions: Arc::clone(&self.sessions) }
    }
}

impl<E: Environment> Coordinator<E> {
    /// Create a coordinator and the receiver for unsolicited notifications.
    pub fn new(
        env: E,
        transport: Arc<dyn Transport>,
        parser: Arc<dyn ContactParser>,
        config: CoordinatorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (status, _) = broadcast::channel(config.status_buffer());
        let shared = Arc::new(Shared { env, transport, parser, config, outbound, status });
        let coordinator = Self { shared, sessions: Arc::new(RwLock::new(HashMap::new())) };
        (coordinator, outbound_rx)
    }

    /// Subscribe to the live status feed.
    ///
    /// Slow subscribers lag and skip events rather than blocking sessions.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.status.subscribe()
    }

    /// Deliver one front end event and return the direct replies.
    ///
    /// The session is created on first contact.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::WorkerGone` if the user's worker stopped
    pub async fn handle_event(
        &self,
        user_id: UserId,
        event: SessionEvent,
    ) -> Result<Vec<Notification>, CoordinatorError> {
        let inbox = self.inbox(user_id).await;
        let (reply, replied) = oneshot::channel();
        inbox
            .send(Envelope::Event { event, reply })
            .await
            .map_err(|_| CoordinatorError::WorkerGone(user_id))?;
        replied.await.map_err(|_| CoordinatorError::WorkerGone(user_id))
    }

    /// Current step of a user's session. Unknown users are awaiting contacts.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::WorkerGone` if the user's worker stopped
    pub async fn phase(&self, user_id: UserId) -> Result<SessionPhase, CoordinatorError> {
        let Some(inbox) = self.sessions.read().await.get(&user_id).cloned() else {
            return Ok(SessionPhase::AwaitingContacts);
        };
        let (reply, replied) = oneshot::channel();
        inbox
            .send(Envelope::Phase { reply })
            .await
            .map_err(|_| CoordinatorError::WorkerGone(user_id))?;
        replied.await.map_err(|_| CoordinatorError::WorkerGone(user_id))
    }

    /// Number of users with a session.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn inbox(&self, user_id: UserId) -> mpsc::Sender<Envelope> {
        if let Some(inbox) = self.sessions.read().await.get(&user_id)
            && !inbox.is_closed()
        {
            return inbox.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(inbox) = sessions.get(&user_id)
            && !inbox.is_closed()
        {
            return inbox.clone();
        }

        let (inbox, envelopes) = mpsc::channel(self.shared.config.inbox_depth());
        let session = Session::new(
            user_id,
            Arc::clone(&self.shared.parser),
            self.shared.config.link.pairing_timeout,
        );
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            session,
            envelopes,
            run: None,
            retiring: None,
        };
        tokio::spawn(worker.run());
        tracing::debug!(user_id, "session worker started");

        sessions.insert(user_id, inbox.clone());
        inbox
    }
}

struct ActiveRun {
    run_id: u64,
    cancel: CancellationToken,
    updates: mpsc::UnboundedReceiver<RunEvent>,
    task: JoinHandle<()>,
}

enum Step {
    Envelope(Option<Envelope>),
    Run(u64, Option<RunEvent>),
}

struct Worker<E: Environment> {
    shared: Arc<Shared<E>>,
    session: Session,
    envelopes: mpsc::Receiver<Envelope>,
    run: Option<ActiveRun>,
    /// Task of the last cancelled run, joined by the next run.
    retiring: Option<JoinHandle<()>>,
}

impl<E: Environment> Worker<E> {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                envelope = self.envelopes.recv() => Step::Envelope(envelope),
                (run_id, update) = next_update(&mut self.run) => Step::Run(run_id, update),
            };

            match step {
                Step::Envelope(Some(Envelope::Event { event, reply })) => {
                    let actions = self.session.handle(event);
                    let replies = self.execute(actions);
                    // Err means the caller gave up waiting; the state change stands.
                    let _ = reply.send(replies);
                },
                Step::Envelope(Some(Envelope::Phase { reply })) => {
                    let _ = reply.send(self.session.phase());
                },
                Step::Envelope(None) => break,
                Step::Run(run_id, Some(event)) => {
                    let finished = event.ends_run();
                    let actions = self.session.handle_run(run_id, event);
                    let notifications = self.execute(actions);
                    self.forward(notifications);
                    if finished {
                        self.run = None;
                    }
                },
                Step::Run(run_id, None) => {
                    self.run = None;
                    let actions = self.session.abort_run(run_id);
                    let notifications = self.execute(actions);
                    self.forward(notifications);
                },
            }
        }

        self.cancel_run();
        tracing::debug!(user_id = self.session.user_id(), "session worker stopped");
    }

    /// Apply side-effects and return the notifications.
    fn execute(&mut self, actions: Vec<SessionAction>) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for action in actions {
            match action {
                SessionAction::Notify(notification) => notifications.push(notification),
                SessionAction::Publish(event) => {
                    // No subscribers is fine.
                    let _ = self.shared.status.send(event);
                },
                SessionAction::StartRun { run_id, identifier, recipients, message } => {
                    self.cancel_run();
                    let previous = self.retiring.take();
                    let run = self.spawn_run(run_id, previous, identifier, recipients, message);
                    self.run = Some(run);
                },
                SessionAction::CancelRun { run_id } => {
                    if self.run.as_ref().is_some_and(|run| run.run_id == run_id) {
                        self.cancel_run();
                    }
                },
            }
        }
        notifications
    }

    fn forward(&self, notifications: Vec<Notification>) {
        let user_id = self.session.user_id();
        for notification in notifications {
            let _ = self.shared.outbound.send(Outbound { user_id, notification });
        }
    }

    fn cancel_run(&mut self) {
        if let Some(run) = self.run.take() {
            tracing::info!(user_id = self.session.user_id(), run_id = run.run_id, "cancelling run");
            run.cancel.cancel();
            self.retiring = Some(run.task);
        }
    }

    fn spawn_run(
        &self,
        run_id: u64,
        previous: Option<JoinHandle<()>>,
        identifier: Address,
        recipients: Vec<Contact>,
        message: String,
    ) -> ActiveRun {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let user_id = self.session.user_id();

        let task = tokio::spawn(async move {
            let run =
                RunTask { shared: &shared, user_id, run_id, updates: &updates, cancel: &token };
            if let Some(previous) = previous {
                run.join_previous(previous).await;
            }
            run.execute(&identifier, &recipients, &message).await;
        });

        ActiveRun { run_id, cancel, updates: updates_rx, task }
    }
}

async fn next_update(run: &mut Option<ActiveRun>) -> (u64, Option<RunEvent>) {
    match run {
        Some(run) => (run.run_id, run.updates.recv().await),
        None => std::future::pending().await,
    }
}

/// Link then deliver, reporting to the worker.
struct RunTask<'a, E: Environment> {
    shared: &'a Shared<E>,
    user_id: UserId,
    run_id: u64,
    updates: &'a mpsc::UnboundedSender<RunEvent>,
    cancel: &'a CancellationToken,
}

impl<E: Environment> RunTask<'_, E> {
    async fn join_previous(&self, previous: JoinHandle<()>) {
        tokio::select! {
            joined = previous => {
                if let Err(e) = joined {
                    tracing::warn!(user_id = self.user_id, error = %e, "previous run panicked");
                }
            },
            () = self.shared.env.sleep(RUN_SHUTDOWN_GRACE) => {
                tracing::warn!(
                    user_id = self.user_id,
                    run_id = self.run_id,
                    "previous run still shutting down, starting anyway"
                );
            },
        }
    }

    async fn execute(&self, identifier: &Address, recipients: &[Contact], message: &str) {
        let (user_id, run_id) = (self.user_id, self.run_id);
        let linked = establish(
            self.shared.transport.as_ref(),
            identifier,
            &self.shared.config.link,
            &self.shared.env,
            self.updates,
            self.cancel,
        )
        .await;

        let link = match linked {
            Ok(link) => link,
            Err(LinkError::Cancelled) => {
                tracing::info!(user_id, run_id, "run cancelled while linking");
                return;
            },
            Err(error) => {
                self.report(RunEvent::LinkFailed(error));
                return;
            },
        };
        self.report(RunEvent::LinkReady);

        let config = self.shared.config.broadcast.clone();
        let engine = BroadcastEngine::new(self.shared.env.clone(), config);
        let mut progress = |snapshot| self.report(RunEvent::Progress(snapshot));
        match engine.run(recipients, message, link, &mut progress, self.cancel).await {
            BroadcastOutcome::Completed(report) => self.report(RunEvent::Finished(report)),
            BroadcastOutcome::LinkLost { report, reason } => {
                if let Err(e) = self.shared.transport.purge_credentials(identifier).await {
                    tracing::warn!(user_id, run_id, error = %e, "failed to purge credentials");
                }
                self.report(RunEvent::LinkLost { report, reason });
            },
            BroadcastOutcome::Cancelled { attempted } => {
                tracing::info!(user_id, run_id, attempted, "run cancelled during delivery");
            },
        }
    }

    fn report(&self, event: RunEvent) {
        // Worker gone means the run was abandoned.
        let _ = self.updates.send(event);
    }
}
