//! Console error types.

use std::{io, path::PathBuf};

use thiserror::Error;
use vcfcast_app::CoordinatorError;

/// Errors raised while driving the console.
///
/// Decoding and fetch errors affect a single input line, which is logged and
/// skipped. `Io` on the output stream ends the console, and `Client` only
/// occurs at startup.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Input line is not a valid command, or output failed to encode
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Contact numbers on the console are 1-based
    #[error("contact numbers start at 1")]
    ZeroIndex,

    /// Contact file could not be read
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        /// File named by the command
        path: PathBuf,
        /// Underlying failure
        source: io::Error,
    },

    /// Contact link is not an http(s) URL
    #[error("not a web link: {0:?}")]
    NotALink(String),

    /// Contact link could not be fetched
    #[error("cannot fetch {url}: {source}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Underlying failure
        source: reqwest::Error,
    },

    /// Server answered the contact link with an error status
    #[error("fetching {url} returned HTTP {status}")]
    FetchStatus {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Contact file behind the link is too large
    #[error("{url} is larger than {limit} bytes")]
    FetchTooLarge {
        /// Requested URL
        url: String,
        /// Size limit in bytes
        limit: usize,
    },

    /// HTTP client could not be built
    #[error("http client: {0}")]
    Client(#[source] reqwest::Error),

    /// Session worker is gone
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Reading input or writing output failed
    #[error("console i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl ConsoleError {
    /// Whether the console can continue with the next input line.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Client(_))
    }
}
