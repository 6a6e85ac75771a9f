//! Texts for the chat front end.
//!
//! A [`Notification`] carries structured data; its `Display` impl renders the
//! user-facing text. Rendering markup (buttons, formatting) is up to the
//! front end.

use std::{fmt, time::Duration};

use vcfcast_core::{Address, Contact, PairingCode, ToggleOutcome};

use crate::{BroadcastProgress, BroadcastReport, SessionError};

/// Outbound message for the chat front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Usage guide, sent on `/start`.
    Welcome,

    /// Contact file accepted.
    ContactsLoaded {
        /// Contacts in upload order.
        contacts: Vec<Contact>,
        /// Phone values dropped as too short or duplicate.
        skipped: usize,
    },

    /// File parsed but held no usable phone numbers.
    NoUsableContacts,

    /// One contact toggled.
    SelectionToggled {
        /// Contact name.
        name: String,
        /// Whether it was added or removed.
        outcome: ToggleOutcome,
        /// Selection size afterwards.
        selected: usize,
    },

    /// Select-all or clear-all applied.
    SelectionChanged {
        /// False if the selection already was in the requested state.
        changed: bool,
        /// Selection size afterwards.
        selected: usize,
    },

    /// Recipients confirmed.
    SelectionConfirmed {
        /// Number of recipients.
        count: usize,
    },

    /// Message body stored.
    MessageStored {
        /// The message as entered.
        message: String,
    },

    /// Link attempt started.
    LinkStarting {
        /// Sending account.
        identifier: Address,
    },

    /// Pairing code to enter on the phone.
    PairingCode {
        /// The code.
        code: PairingCode,
        /// How long the user has to enter it.
        window: Duration,
    },

    /// Automatic reconnect after a transient disconnect.
    Reconnecting {
        /// 1-based reconnect number.
        attempt: u32,
    },

    /// Link ready, delivery starting.
    LinkConnected {
        /// Number of recipients.
        recipients: usize,
    },

    /// Delivery progress.
    Progress(BroadcastProgress),

    /// Final report.
    Report(BroadcastReport),

    /// Report of a run that ended early because the link was lost.
    Interrupted(BroadcastReport),

    /// Something went wrong; the text says what to do next.
    Error(SessionError),
}

impl Notification {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ContactsLoaded { .. } => "contacts_loaded",
            Self::NoUsableContacts => "no_usable_contacts",
            Self::SelectionToggled { .. } => "selection_toggled",
            Self::SelectionChanged { .. } => "selection_changed",
            Self::SelectionConfirmed { .. } => "selection_confirmed",
            Self::MessageStored { .. } => "message_stored",
            Self::LinkStarting { .. } => "link_starting",
            Self::PairingCode { .. } => "pairing_code",
            Self::Reconnecting { .. } => "reconnecting",
            Self::LinkConnected { .. } => "link_connected",
            Self::Progress(_) => "progress",
            Self::Report(_) | Self::Interrupted(_) => "report",
            Self::Error(_) => "error",
        }
    }
}

impl From<SessionError> for Notification {
    fn from(error: SessionError) -> Self {
        Self::Error(error)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => f.write_str(
                "🚀 Welcome to the VCF broadcast bot!\n\n\
                 1. Send a VCF contact file\n\
                 2. Select the contacts to include\n\
                 3. Enter your broadcast message\n\
                 4. Link your account with an 8-character pairing code",
            ),
            Self::ContactsLoaded { contacts, skipped } => {
                writeln!(f, "📱 Found contacts:")?;
                for (i, contact) in contacts.iter().enumerate() {
                    let address = contact.address.display_local();
                    write!(f, "\n#{} {}\n{address}\n", i + 1, contact.name)?;
                }
                if *skipped > 0 {
                    write!(f, "\n⚠️ Skipped {skipped} invalid or duplicate numbers\n")?;
                }
                f.write_str(
                    "\n✅ Toggle contacts and confirm, or send comma-separated numbers (e.g. 1,3,5)",
                )
            },
            Self::NoUsableContacts => f.write_str("❌ No valid phone numbers found in the VCF file"),
            Self::SelectionToggled { name, outcome, selected } => match outcome {
                ToggleOutcome::Added => write!(f, "✅ Added {name} ({selected} selected)"),
                ToggleOutcome::Removed => write!(f, "➖ Removed {name} ({selected} selected)"),
            },
            Self::SelectionChanged { changed: true, selected } => {
                write!(f, "✅ {selected} contacts selected")
            },
            Self::SelectionChanged { changed: false, selected } => {
                write!(f, "No changes ({selected} selected)")
            },
            Self::SelectionConfirmed { count } => {
                write!(f, "✅ Selected {count} contacts\n\n📝 Send your broadcast message:")
            },
            Self::MessageStored { message } => write!(
                f,
                "📨 Broadcast message set:\n\n{message}\n\n\
                 🔗 Send the phone number of the sending account (e.g. +15551234567)"
            ),
            Self::LinkStarting { identifier } => write!(
                f,
                "🔗 Linking {}...\n⏳ Generating 8-character pairing code...",
                identifier.display_local()
            ),
            Self::PairingCode { code, window } => write!(
                f,
                "🔑 Pairing code\n\n\
                 Enter this code on your phone:\n\n\
                 {code}\n\n\
                 1. Open Settings > Linked Devices\n\
                 2. Tap \"Link a Device\"\n\
                 3. Enter the code above\n\n\
                 ⏳ You have {} seconds to enter the code",
                window.as_secs()
            ),
            Self::Reconnecting { attempt } => write!(f, "🔄 Reconnecting (attempt {attempt})..."),
            Self::LinkConnected { recipients } => write!(
                f,
                "✅ Connected successfully! Starting broadcast to {recipients} contacts..."
            ),
            Self::Progress(progress) => write!(
                f,
                "📤 Progress: {}% ({}/{})\n✅ Sent: {}\n❌ Failed: {}",
                progress.percent(),
                progress.done,
                progress.total,
                progress.succeeded,
                progress.failed
            ),
            Self::Report(report) => render_report(f, "🎉 Broadcast completed!", report),
            Self::Interrupted(report) => render_report(f, "🛑 Broadcast stopped early!", report),
            Self::Error(error) => render_error(f, error),
        }
    }
}

fn render_report(
    f: &mut fmt::Formatter<'_>,
    heading: &str,
    report: &BroadcastReport,
) -> fmt::Result {
    write!(
        f,
        "{heading}\n\n📊 Attempted: {}\n✅ Sent: {}\n❌ Failed: {}",
        report.attempted, report.succeeded, report.failed
    )?;
    if report.failed > 0 {
        f.write_str("\n\nFailed contacts:")?;
        for (contact, reason) in report.failures() {
            let address = contact.address.display_local();
            write!(f, "\n• {} ({address}): {reason}", contact.name)?;
        }
    }
    Ok(())
}

fn render_error(f: &mut fmt::Formatter<'_>, error: &SessionError) -> fmt::Result {
    match error {
        SessionError::MalformedInput(reason) => {
            write!(f, "❌ Please send a valid VCF file\n\n{reason}")
        },
        SessionError::EmptySelection => {
            f.write_str("❌ No contacts selected. Select at least one contact first.")
        },
        SessionError::InvalidIdentifier(raw) => write!(
            f,
            "❌ {raw:?} is not a valid phone number. \
             Send digits with an optional leading +, at least 8 characters."
        ),
        SessionError::InvalidSelection { indices, len } => {
            let listed: Vec<String> = indices.iter().map(|i| (i + 1).to_string()).collect();
            write!(f, "❌ Invalid indices: {}\nValid range: 1-{len}", listed.join(", "))
        },
        SessionError::LinkTimeout { stage, elapsed } => write!(
            f,
            "⌛ The {stage} wait expired after {}s.\n\
             Send the phone number again to retry.",
            elapsed.as_secs()
        ),
        SessionError::LinkRejected(reason) => write!(
            f,
            "❌ Link rejected ({reason}). Stored credentials were removed.\n\n\
             Send your contact file again to start over."
        ),
        SessionError::LinkLost(reason) => write!(
            f,
            "❌ Session ended during the broadcast ({reason}).\n\
             Stored credentials were removed.\n\n\
             Send your contact file again to start over."
        ),
        SessionError::SendFailure { address, reason } => {
            write!(f, "❌ Failed to send to {}: {reason}", address.display_local())
        },
        SessionError::TransportUnavailable(reason) => write!(
            f,
            "❌ Connection failed: {reason}\n\n\
             Send your contact file again to start over."
        ),
        SessionError::OutOfStep { phase } => {
            write!(f, "⚠️ Please follow the current step: {}", phase.hint())
        },
    }
}
