//! Console input commands.
//!
//! One JSON object per line, tagged by `command`:
//!
//! ```text
//! {"user_id": 1, "command": "contact_file", "path": "contacts.vcf"}
//! {"user_id": 1, "command": "contact_url", "url": "https://example.com/contacts.vcf"}
//! {"user_id": 1, "command": "toggle", "index": 2}
//! {"user_id": 1, "command": "select", "indices": [1, 3]}
//! {"user_id": 1, "command": "message", "text": "See you at eight"}
//! {"user_id": 1, "command": "link", "identifier": "+15550001111"}
//! ```
//!
//! Contact numbers are 1-based as shown in the contact list. `user_id`
//! defaults to `0`.

use std::path::PathBuf;

use serde::Deserialize;
use vcfcast_app::{SessionEvent, UserId};

use crate::{ConsoleError, ContactFetcher, FetchedFile};

/// One input line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Inbound {
    /// Chat the command came from.
    #[serde(default)]
    pub user_id: UserId,
    /// What the user did.
    #[serde(flatten)]
    pub command: Command,
}

impl Inbound {
    /// Decode one input line.
    pub fn parse(line: &str) -> Result<Self, ConsoleError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// User interaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// `/start`.
    Start,
    /// Upload a contact file from disk.
    ContactFile {
        /// File to read.
        path: PathBuf,
        /// Declared content type.
        #[serde(default)]
        mime_type: Option<String>,
    },
    /// Download a contact file from a link.
    ContactUrl {
        /// `http` or `https` link.
        url: String,
    },
    /// Flip one contact.
    Toggle {
        /// 1-based contact number.
        index: usize,
    },
    /// Select every contact.
    SelectAll,
    /// Deselect everything.
    ClearAll,
    /// Confirm the current selection.
    Confirm,
    /// Pick recipients by number and confirm.
    Select {
        /// 1-based contact numbers.
        indices: Vec<usize>,
    },
    /// Message to broadcast.
    Message {
        /// Body.
        text: String,
    },
    /// Phone number of the sending account.
    Link {
        /// Raw identifier.
        identifier: String,
    },
}

impl Command {
    /// Turn the command into a session event, reading or fetching files as
    /// needed.
    pub async fn into_event(self, fetcher: &ContactFetcher) -> Result<SessionEvent, ConsoleError> {
        let event = match self {
            Self::Start => SessionEvent::RestartSession,
            Self::ContactFile { path, mime_type } => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| ConsoleError::ReadFile { path, source })?;
                SessionEvent::ContactFileReceived { bytes, mime_type }
            },
            Self::ContactUrl { url } => {
                let FetchedFile { bytes, mime_type } = fetcher.fetch(&url).await?;
                SessionEvent::ContactFileReceived { bytes, mime_type }
            },
            Self::Toggle { index } => SessionEvent::ToggleContact(zero_based(index)?),
            Self::SelectAll => SessionEvent::SelectAll,
            Self::ClearAll => SessionEvent::ClearAll,
            Self::Confirm => SessionEvent::ConfirmSelection,
            Self::Select { indices } => {
                let indices = indices.into_iter().map(zero_based).collect::<Result<_, _>>()?;
                SessionEvent::RecipientsSelected(indices)
            },
            Self::Message { text } => SessionEvent::MessageEntered(text),
            Self::Link { identifier } => SessionEvent::LinkIdentifierEntered(identifier),
        };
        Ok(event)
    }
}

fn zero_based(index: usize) -> Result<usize, ConsoleError> {
    index.checked_sub(1).ok_or(ConsoleError::ZeroIndex)
}
