//! Per-user session state machine.
//!
//! [`Session`] sequences one user's workflow: contact upload, recipient
//! selection, message entry, link identifier entry, linking and delivery.
//! It is pure: events in, [`SessionAction`]s out. The coordinator's worker
//! executes the actions and feeds run progress back through
//! [`Session::handle_run`].
//!
//! # Routing
//!
//! Every event is matched against the current [`SessionState`]. An event that
//! is not valid for the current step is answered with
//! [`SessionError::OutOfStep`] and leaves the state untouched. The only event
//! accepted in every state is [`SessionEvent::RestartSession`].
//!
//! # Runs
//!
//! Entering `Linking` allocates a fresh run id. Run events carrying any other
//! id are stale (a cancelled run still draining) and are ignored, so at most
//! one run ever drives the session.

use std::{mem, sync::Arc, time::Duration};

use vcfcast_core::{Address, Contact, ContactParser, ContactSet, SelectionTracker, decode_upload};
use vcfcast_link::{LinkStatus, LinkUpdate};

use crate::{
    Notification, RunEvent, SessionAction, SessionError, SessionEvent, SessionPhase, SessionState,
    StatusEvent, UserId,
};

type Transition = (SessionState, Vec<SessionAction>);

/// One user's session.
pub struct Session {
    user_id: UserId,
    parser: Arc<dyn ContactParser>,
    /// Shown to the user alongside the pairing code.
    pairing_window: Duration,
    state: SessionState,
    /// Last allocated run id.
    runs: u64,
}

impl Session {
    /// Fresh session in `AwaitingContacts`.
    pub fn new(user_id: UserId, parser: Arc<dyn ContactParser>, pairing_window: Duration) -> Self {
        Self { user_id, parser, pairing_window, state: SessionState::default(), runs: 0 }
    }

    /// Owning user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current step.
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Run currently driving the session, if any.
    pub fn active_run(&self) -> Option<u64> {
        self.state.run_id()
    }

    /// Process a front end event.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if matches!(event, SessionEvent::RestartSession) {
            return self.restart();
        }

        let state = mem::take(&mut self.state);
        let (next, actions) = match (state, event) {
            (
                SessionState::AwaitingContacts,
                SessionEvent::ContactFileReceived { bytes, mime_type },
            ) => self.load_contacts(&bytes, mime_type.as_deref()),

            (
                SessionState::SelectingRecipients { mut selection },
                SessionEvent::ToggleContact(index),
            ) => {
                let action = match selection.toggle_index(index) {
                    Ok(outcome) => {
                        let contacts = selection.contacts();
                        let name = contacts.get(index).map(|c| c.name.clone()).unwrap_or_default();
                        notify(Notification::SelectionToggled {
                            name,
                            outcome,
                            selected: selection.len(),
                        })
                    },
                    Err(e) => notify(Notification::Error(e.into())),
                };
                (SessionState::SelectingRecipients { selection }, vec![action])
            },

            (SessionState::SelectingRecipients { mut selection }, SessionEvent::SelectAll) => {
                let changed = selection.select_all();
                let action =
                    notify(Notification::SelectionChanged { changed, selected: selection.len() });
                (SessionState::SelectingRecipients { selection }, vec![action])
            },

            (SessionState::SelectingRecipients { mut selection }, SessionEvent::ClearAll) => {
                let changed = selection.clear();
                let action =
                    notify(Notification::SelectionChanged { changed, selected: selection.len() });
                (SessionState::SelectingRecipients { selection }, vec![action])
            },

            (SessionState::SelectingRecipients { selection }, SessionEvent::ConfirmSelection) => {
                self.confirm(selection)
            },

            (
                SessionState::SelectingRecipients { mut selection },
                SessionEvent::RecipientsSelected(indices),
            ) => {
                let replaced = if indices.is_empty() {
                    Err(SessionError::EmptySelection)
                } else {
                    selection.replace_with_indices(&indices).map_err(SessionError::from)
                };
                match replaced {
                    Ok(_) => self.confirm(selection),
                    Err(e) => (SessionState::SelectingRecipients { selection }, vec![notify(
                        Notification::Error(e),
                    )]),
                }
            },

            (
                SessionState::AwaitingMessage { recipients },
                SessionEvent::MessageEntered(message),
            ) => {
                let action = notify(Notification::MessageStored { message: message.clone() });
                (SessionState::AwaitingLinkIdentifier { recipients, message }, vec![action])
            },

            (
                SessionState::AwaitingLinkIdentifier { recipients, message },
                SessionEvent::LinkIdentifierEntered(raw),
            ) => match Address::parse(&raw) {
                Ok(identifier) => self.start_run(identifier, recipients, message),
                Err(e) => {
                    tracing::debug!(user_id = self.user_id, %e, "link identifier rejected");
                    (SessionState::AwaitingLinkIdentifier { recipients, message }, vec![notify(
                        Notification::Error(e.into()),
                    )])
                },
            },

            (state, event) => {
                let phase = state.phase();
                tracing::debug!(
                    user_id = self.user_id,
                    %phase,
                    event = event.name(),
                    "event rejected for current step"
                );
                (state, vec![notify(Notification::Error(SessionError::OutOfStep { phase }))])
            },
        };

        self.settle(next, actions)
    }

    /// Process an event from run `run_id`.
    ///
    /// Events from any run other than the active one are dropped.
    pub fn handle_run(&mut self, run_id: u64, event: RunEvent) -> Vec<SessionAction> {
        if self.state.run_id() != Some(run_id) {
            tracing::debug!(user_id = self.user_id, run_id, "stale run event ignored");
            return Vec::new();
        }

        let user_id = self.user_id;
        let state = mem::take(&mut self.state);
        let (next, actions) = match (state, event) {
            (state, RunEvent::Link(LinkUpdate::Status(status))) => {
                let published = StatusEvent::StatusChanged { user_id, status };
                (state, vec![SessionAction::Publish(published)])
            },

            (state, RunEvent::Link(LinkUpdate::PairingCode(code))) => {
                let published = StatusEvent::PairingCodeIssued { user_id, code: code.clone() };
                (state, vec![
                    SessionAction::Publish(published),
                    notify(Notification::PairingCode { code, window: self.pairing_window }),
                ])
            },

            (state, RunEvent::Link(LinkUpdate::Reconnecting { attempt })) => {
                (state, vec![notify(Notification::Reconnecting { attempt })])
            },

            (SessionState::Linking { run_id, identifier, recipients, .. }, RunEvent::LinkReady) => {
                let total = recipients.len();
                tracing::info!(user_id, run_id, %identifier, total, "delivery starting");
                (SessionState::Broadcasting { run_id, identifier, total }, vec![notify(
                    Notification::LinkConnected { recipients: total },
                )])
            },

            (SessionState::Linking { recipients, message, .. }, RunEvent::LinkFailed(error)) => {
                let error = SessionError::from(error);
                tracing::warn!(user_id, run_id, %error, "link failed");
                let next = if matches!(error, SessionError::LinkTimeout { .. }) {
                    SessionState::AwaitingLinkIdentifier { recipients, message }
                } else {
                    SessionState::AwaitingContacts
                };
                (next, vec![notify(Notification::Error(error))])
            },

            (state @ SessionState::Broadcasting { .. }, RunEvent::Progress(progress)) => {
                (state, vec![notify(Notification::Progress(progress))])
            },

            (SessionState::Broadcasting { .. }, RunEvent::Finished(report)) => {
                tracing::info!(
                    user_id,
                    run_id,
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "report emitted"
                );
                (SessionState::AwaitingContacts, vec![
                    disconnected(user_id),
                    notify(Notification::Report(report)),
                ])
            },

            (SessionState::Broadcasting { .. }, RunEvent::LinkLost { report, reason }) => {
                tracing::warn!(
                    user_id,
                    run_id,
                    %reason,
                    attempted = report.attempted,
                    "link lost, partial report emitted"
                );
                (SessionState::AwaitingContacts, vec![
                    disconnected(user_id),
                    notify(Notification::Error(SessionError::LinkLost(reason.to_string()))),
                    notify(Notification::Interrupted(report)),
                ])
            },

            (state, event) => {
                let phase = state.phase();
                tracing::debug!(user_id, run_id, %phase, ?event, "run event out of order");
                (state, Vec::new())
            },
        };

        self.settle(next, actions)
    }

    /// The task behind run `run_id` stopped without finishing.
    pub fn abort_run(&mut self, run_id: u64) -> Vec<SessionAction> {
        if self.state.run_id() != Some(run_id) {
            return Vec::new();
        }

        tracing::error!(user_id = self.user_id, run_id, "run stopped unexpectedly");
        self.state = SessionState::AwaitingContacts;
        let error = SessionError::TransportUnavailable("broadcast stopped unexpectedly".into());
        vec![disconnected(self.user_id), notify(Notification::Error(error))]
    }

    fn restart(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if let Some(run_id) = self.state.run_id() {
            tracing::info!(user_id = self.user_id, run_id, "restart cancels run in flight");
            actions.push(SessionAction::CancelRun { run_id });
            actions.push(disconnected(self.user_id));
        }
        self.state = SessionState::AwaitingContacts;
        actions.push(notify(Notification::Welcome));
        actions
    }

    fn load_contacts(&self, bytes: &[u8], mime_type: Option<&str>) -> Transition {
        let parsed = decode_upload(bytes, mime_type).and_then(|text| self.parser.parse(&text));
        let entries = match parsed {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(user_id = self.user_id, %e, "contact file rejected");
                return (SessionState::AwaitingContacts, vec![notify(Notification::Error(
                    e.into(),
                ))]);
            },
        };

        let contacts = ContactSet::from_entries(entries);
        let summary = contacts.summary();
        tracing::info!(
            user_id = self.user_id,
            entries = summary.entries,
            contacts = contacts.len(),
            too_short = summary.too_short,
            duplicates = summary.duplicates,
            "contact set built"
        );

        if contacts.is_empty() {
            return (SessionState::AwaitingContacts, vec![notify(Notification::NoUsableContacts)]);
        }

        let loaded = Notification::ContactsLoaded {
            contacts: contacts.as_slice().to_vec(),
            skipped: summary.skipped(),
        };
        let selection = SelectionTracker::new(Arc::new(contacts));
        (SessionState::SelectingRecipients { selection }, vec![notify(loaded)])
    }

    fn confirm(&self, selection: SelectionTracker) -> Transition {
        if selection.is_empty() {
            return (SessionState::SelectingRecipients { selection }, vec![notify(
                Notification::Error(SessionError::EmptySelection),
            )]);
        }

        let recipients = selection.snapshot();
        let count = recipients.len();
        tracing::info!(user_id = self.user_id, count, "recipients confirmed");
        (SessionState::AwaitingMessage { recipients }, vec![notify(
            Notification::SelectionConfirmed { count },
        )])
    }

    fn start_run(
        &mut self,
        identifier: Address,
        recipients: Vec<Contact>,
        message: String,
    ) -> Transition {
        self.runs += 1;
        let run_id = self.runs;
        tracing::info!(
            user_id = self.user_id,
            run_id,
            %identifier,
            recipients = recipients.len(),
            "link requested"
        );

        let actions = vec![
            notify(Notification::LinkStarting { identifier: identifier.clone() }),
            SessionAction::StartRun {
                run_id,
                identifier: identifier.clone(),
                recipients: recipients.clone(),
                message: message.clone(),
            },
        ];
        (SessionState::Linking { run_id, identifier, recipients, message }, actions)
    }

    fn settle(&mut self, next: SessionState, actions: Vec<SessionAction>) -> Vec<SessionAction> {
        self.state = next;
        actions
    }
}

fn notify(notification: Notification) -> SessionAction {
    SessionAction::Notify(notification)
}

fn disconnected(user_id: UserId) -> SessionAction {
    SessionAction::Publish(StatusEvent::StatusChanged { user_id, status: LinkStatus::Disconnected })
}
