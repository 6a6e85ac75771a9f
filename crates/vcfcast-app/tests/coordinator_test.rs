//! End-to-end sessions through the coordinator.
//!
//! Every test drives a real [`Coordinator`] against a [`ScriptedTransport`]
//! on paused tokio time: send delays, pairing windows and backoffs elapse
//! instantly but keep their order.
//!
//! # Oracle Pattern
//!
//! Tests end with oracle checks that verify:
//! - The report tallies match what the transport recorded
//! - The session is back in a step the user can continue from
//! - No transport handle is left open

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::sync::mpsc::UnboundedReceiver;
use vcfcast_app::{
    BroadcastReport, Coordinator, CoordinatorConfig, Notification, Outbound, SessionError,
    SessionEvent, SessionPhase, StatusEvent, UserId,
};
use vcfcast_core::{Address, CardReader, PairingCode};
use vcfcast_harness::{
    AttemptScript, DEFAULT_PAIRING_CODE, FailurePlan, ScriptedTransport, SimEnv, alice_and_bob,
};
use vcfcast_link::{DisconnectReason, LinkStatus, TransportSignal};

const USER: UserId = 42;

fn coordinator(
    transport: &ScriptedTransport,
) -> (Coordinator<SimEnv>, UnboundedReceiver<Outbound>) {
    Coordinator::new(
        SimEnv::new(),
        Arc::new(transport.clone()),
        Arc::new(CardReader::new()),
        CoordinatorConfig::default(),
    )
}

async fn send(
    coordinator: &Coordinator<SimEnv>,
    user: UserId,
    event: SessionEvent,
) -> Vec<Notification> {
    coordinator.handle_event(user, event).await.unwrap()
}

/// Upload Alice and Bob, select both, enter "Hello".
async fn prepare(coordinator: &Coordinator<SimEnv>, user: UserId) {
    let upload = SessionEvent::ContactFileReceived {
        bytes: alice_and_bob().into_bytes(),
        mime_type: Some("text/x-vcard".into()),
    };
    send(coordinator, user, upload).await;
    send(coordinator, user, SessionEvent::SelectAll).await;
    send(coordinator, user, SessionEvent::ConfirmSelection).await;
    send(coordinator, user, SessionEvent::MessageEntered("Hello".into())).await;
}

fn link_to(identifier: &str) -> SessionEvent {
    SessionEvent::LinkIdentifierEntered(identifier.into())
}

/// Collect outbound notifications up to and including the first match.
async fn wait_for(
    outbound: &mut UnboundedReceiver<Outbound>,
    done: impl Fn(&Notification) -> bool,
) -> Vec<Notification> {
    let collect = async {
        let mut seen = Vec::new();
        while let Some(out) = outbound.recv().await {
            let matched = done(&out.notification);
            seen.push(out.notification);
            if matched {
                return seen;
            }
        }
        panic!("outbound channel closed");
    };
    tokio::time::timeout(Duration::from_secs(3600), collect).await.expect("notification never sent")
}

async fn wait_for_report(outbound: &mut UnboundedReceiver<Outbound>) -> BroadcastReport {
    let seen = wait_for(outbound, |n| matches!(n, Notification::Report(_))).await;
    match seen.last() {
        Some(Notification::Report(report)) => report.clone(),
        other => panic!("expected report, got {other:?}"),
    }
}

fn drain(outbound: &mut UnboundedReceiver<Outbound>) -> Vec<Notification> {
    let mut seen = Vec::new();
    while let Ok(out) = outbound.try_recv() {
        seen.push(out.notification);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn alice_and_bob_partial_failure() {
    let bob = Address::parse("+15557654321").unwrap();
    let transport = ScriptedTransport::pairing_then_connected()
        .failing(FailurePlan::Addresses(HashSet::from([bob.clone()])));
    let (coordinator, mut outbound) = coordinator(&transport);
    let mut status = coordinator.subscribe_status();

    prepare(&coordinator, USER).await;
    let replies = send(&coordinator, USER, link_to("+1 555 000 9999")).await;
    assert!(matches!(replies.as_slice(), [Notification::LinkStarting { .. }]));

    let seen = wait_for(&mut outbound, |n| matches!(n, Notification::Report(_))).await;

    // ORACLE: one success, Bob failed, in that order
    let Some(Notification::Report(report)) = seen.last() else {
        panic!("no report");
    };
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_contacts.len(), 1);
    assert_eq!(report.failed_contacts[0].name, "Bob");
    assert_eq!(report.failed_contacts[0].address, bob);

    // ORACLE: the user saw the pairing code before the link came up
    let kinds: Vec<&str> = seen.iter().map(Notification::kind).collect();
    assert_eq!(kinds, ["pairing_code", "link_connected", "progress", "report"]);

    // ORACLE: every send carried the message, handle released, session reset
    assert!(transport.sends().iter().all(|s| s.text == "Hello"));
    assert_eq!(transport.open_handles(), 0);
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingContacts);

    let mut feed = Vec::new();
    while let Ok(event) = status.try_recv() {
        feed.push(event);
    }
    let code = PairingCode::parse(DEFAULT_PAIRING_CODE).unwrap();
    assert_eq!(feed, vec![
        StatusEvent::StatusChanged { user_id: USER, status: LinkStatus::Connecting },
        StatusEvent::StatusChanged { user_id: USER, status: LinkStatus::AwaitingPairing },
        StatusEvent::PairingCodeIssued { user_id: USER, code },
        StatusEvent::StatusChanged { user_id: USER, status: LinkStatus::Connected },
        StatusEvent::StatusChanged { user_id: USER, status: LinkStatus::Disconnected },
    ]);
}

#[tokio::test(start_paused = true)]
async fn identifier_without_digits_is_rejected() {
    let transport = ScriptedTransport::already_linked();
    let (coordinator, _outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;

    let replies = send(&coordinator, USER, link_to("abc")).await;

    // ORACLE: rejected with the identifier error, still waiting, nothing dialled
    assert_eq!(replies, vec![Notification::Error(SessionError::InvalidIdentifier("abc".into()))]);
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingLinkIdentifier);
    assert_eq!(transport.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn upload_during_broadcast_leaves_report_intact() {
    let transport = ScriptedTransport::already_linked().with_send_latency(Duration::from_secs(5));
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;
    wait_for(&mut outbound, |n| matches!(n, Notification::LinkConnected { .. })).await;

    let upload = SessionEvent::ContactFileReceived {
        bytes: alice_and_bob().into_bytes(),
        mime_type: None,
    };
    let replies = send(&coordinator, USER, upload).await;

    assert_eq!(replies, vec![Notification::Error(SessionError::OutOfStep {
        phase: SessionPhase::Broadcasting
    })]);

    // ORACLE: the in-flight run finishes with a complete tally
    let report = wait_for_report(&mut outbound).await;
    assert_eq!((report.attempted, report.succeeded, report.failed), (2, 2, 0));
    assert_eq!(transport.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_during_broadcast_cancels_without_report() {
    let transport = ScriptedTransport::already_linked().with_send_latency(Duration::from_secs(5));
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;
    wait_for(&mut outbound, |n| matches!(n, Notification::LinkConnected { .. })).await;

    let replies = send(&coordinator, USER, SessionEvent::RestartSession).await;
    assert_eq!(replies, vec![Notification::Welcome]);
    tokio::time::sleep(Duration::from_secs(60)).await;

    // ORACLE: no further sends, handle released, partial report discarded
    assert!(transport.sends().is_empty());
    assert_eq!(transport.open_handles(), 0);
    assert!(!drain(&mut outbound).iter().any(|n| matches!(n, Notification::Report(_))));
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingContacts);
}

#[tokio::test(start_paused = true)]
async fn restart_while_pairing_releases_the_link() {
    let transport = ScriptedTransport::with_fallback(AttemptScript::pairing_never_completes());
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;
    wait_for(&mut outbound, |n| matches!(n, Notification::PairingCode { .. })).await;

    send(&coordinator, USER, SessionEvent::RestartSession).await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    // ORACLE: the pairing window passing later produces nothing
    assert_eq!(transport.open_handles(), 0);
    assert!(drain(&mut outbound).is_empty());
}

#[tokio::test(start_paused = true)]
async fn pairing_timeout_keeps_recipients_for_retry() {
    let transport = ScriptedTransport::already_linked()
        .then_attempt(AttemptScript::pairing_never_completes());
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;

    let seen = wait_for(&mut outbound, |n| matches!(n, Notification::Error(_))).await;
    assert!(matches!(seen.last(), Some(Notification::Error(SessionError::LinkTimeout { .. }))));
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingLinkIdentifier);

    send(&coordinator, USER, link_to("+15550009999")).await;
    let report = wait_for_report(&mut outbound).await;

    // ORACLE: second attempt delivers to the recipients confirmed before the timeout
    assert_eq!(report.attempted, 2);
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.open_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn logged_out_link_resets_session() {
    let transport =
        ScriptedTransport::with_fallback(AttemptScript::disconnects(DisconnectReason::LoggedOut));
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;

    let seen = wait_for(&mut outbound, |n| matches!(n, Notification::Error(_))).await;

    // ORACLE: terminal rejection purges credentials and starts over
    assert!(matches!(seen.last(), Some(Notification::Error(SessionError::LinkRejected(_)))));
    assert_eq!(transport.purged(), vec![Address::parse("+15550009999").unwrap()]);
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingContacts);
}

#[tokio::test(start_paused = true)]
async fn logout_during_broadcast_purges_and_reports_partial() {
    let logout = TransportSignal::Disconnected(DisconnectReason::LoggedOut);
    let script = AttemptScript::already_linked().then_after_sends(1, logout);
    let transport = ScriptedTransport::with_fallback(script);
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;

    let seen = wait_for(&mut outbound, |n| matches!(n, Notification::Interrupted(_))).await;

    // ORACLE: Alice got the message, Bob was never attempted
    let Some(Notification::Interrupted(report)) = seen.last() else {
        panic!("no partial report");
    };
    assert_eq!((report.attempted, report.succeeded, report.failed), (1, 1, 0));
    assert_eq!(transport.sends().len(), 1);

    // ORACLE: the user is told why, credentials are gone, session starts over
    let kinds: Vec<&str> = seen.iter().map(Notification::kind).collect();
    assert_eq!(kinds, ["link_connected", "error", "report"]);
    assert!(matches!(seen[1], Notification::Error(SessionError::LinkLost(_))));
    assert_eq!(transport.purged(), vec![Address::parse("+15550009999").unwrap()]);
    assert_eq!(transport.open_handles(), 0);
    assert_eq!(coordinator.phase(USER).await.unwrap(), SessionPhase::AwaitingContacts);
}

#[tokio::test(start_paused = true)]
async fn new_run_waits_for_the_cancelled_one() {
    let transport = ScriptedTransport::already_linked().with_send_latency(Duration::from_secs(5));
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;
    wait_for(&mut outbound, |n| matches!(n, Notification::LinkConnected { .. })).await;

    send(&coordinator, USER, SessionEvent::RestartSession).await;
    prepare(&coordinator, USER).await;
    send(&coordinator, USER, link_to("+15550009999")).await;
    let report = wait_for_report(&mut outbound).await;

    // ORACLE: the first link was closed before the second one opened
    assert_eq!(report.attempted, 2);
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.peak_open_handles(), 1);
    assert_eq!(transport.open_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn users_are_independent() {
    let transport = ScriptedTransport::already_linked().with_send_latency(Duration::from_secs(5));
    let (coordinator, mut outbound) = coordinator(&transport);
    prepare(&coordinator, 1).await;
    send(&coordinator, 1, link_to("+15550000001")).await;

    // A second user walks through the steps while the first one broadcasts
    prepare(&coordinator, 2).await;

    assert_eq!(coordinator.phase(2).await.unwrap(), SessionPhase::AwaitingLinkIdentifier);
    assert_eq!(coordinator.session_count().await, 2);

    let report = wait_for_report(&mut outbound).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(coordinator.phase(1).await.unwrap(), SessionPhase::AwaitingContacts);
}

#[tokio::test(start_paused = true)]
async fn unknown_user_is_awaiting_contacts() {
    let (coordinator, _outbound) = coordinator(&ScriptedTransport::already_linked());

    assert_eq!(coordinator.phase(7).await.unwrap(), SessionPhase::AwaitingContacts);
    assert_eq!(coordinator.session_count().await, 0);
}
