//! JSON-lines front end.
//!
//! The console reads [`Inbound`] commands line by line, hands them to the
//! [`Coordinator`] and writes one JSON object per line to its output:
//!
//! ```text
//! {"user_id":1,"kind":"contacts_loaded","text":"📱 Found contacts:\n..."}
//! {"event":"pairing_code_issued","user_id":1,"code":"K7QP-4M2X"}
//! ```
//!
//! Input lines that are not UTF-8, not valid JSON or not a known command are
//! logged and skipped.
//!
//! Notification lines carry the rendered chat text; status feed events are
//! written as they are serialized. Pending outbound notifications are always
//! written before the next input line is handled, so replies and run
//! progress keep their order.

use std::io;

use serde::Serialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::{broadcast, mpsc},
};
use vcfcast_app::{Coordinator, Notification, Outbound, StatusEvent, UserId};
use vcfcast_core::Environment;

use crate::{ConsoleError, ContactFetcher, Inbound};

/// Notification as written to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationLine {
    /// Recipient user.
    pub user_id: UserId,
    /// Stable notification kind.
    pub kind: &'static str,
    /// Rendered chat text.
    pub text: String,
}

impl NotificationLine {
    /// Render a notification for `user_id`.
    pub fn new(user_id: UserId, notification: &Notification) -> Self {
        Self { user_id, kind: notification.kind(), text: notification.to_string() }
    }
}

enum Input {
    Line(io::Result<Option<String>>),
    Outbound(Outbound),
    Status(Result<StatusEvent, broadcast::error::RecvError>),
    Shutdown,
}

/// Drives a coordinator from a line reader.
pub struct Console<E: Environment, W> {
    coordinator: Coordinator<E>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    status: broadcast::Receiver<StatusEvent>,
    fetcher: ContactFetcher,
    output: W,
}

impl<E: Environment, W: AsyncWrite + Unpin> Console<E, W> {
    /// Attach to a coordinator and its outbound receiver.
    pub fn new(
        coordinator: Coordinator<E>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        output: W,
    ) -> Self {
        let status = coordinator.subscribe_status();
        Self { coordinator, outbound, status, fetcher: ContactFetcher::default(), output }
    }

    /// Download contact links with `fetcher`.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: ContactFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Run until `shutdown` resolves, then return the output stream.
    ///
    /// End of input does not stop the console: running broadcasts keep
    /// reporting until shutdown.
    ///
    /// # Errors
    ///
    /// - `ConsoleError::Io` if reading input or writing output fails
    pub async fn run<R, S>(mut self, input: R, shutdown: S) -> Result<W, ConsoleError>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut status_open = true;
        tokio::pin!(shutdown);

        loop {
            let input = tokio::select! {
                biased;
                () = &mut shutdown => Input::Shutdown,
                Some(outbound) = self.outbound.recv() => Input::Outbound(outbound),
                status = self.status.recv(), if status_open => Input::Status(status),
                line = lines.next_line(), if input_open => Input::Line(line),
            };

            match input {
                Input::Shutdown => break,
                Input::Outbound(Outbound { user_id, notification }) => {
                    self.write(&NotificationLine::new(user_id, &notification)).await?;
                },
                Input::Status(Ok(event)) => self.write(&event).await?,
                Input::Status(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "status feed lagged");
                },
                Input::Status(Err(broadcast::error::RecvError::Closed)) => status_open = false,
                Input::Line(Ok(None)) => {
                    tracing::info!("input closed, waiting for shutdown");
                    input_open = false;
                },
                Input::Line(Err(error)) if error.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!(%error, "skipping undecodable input line");
                },
                Input::Line(Err(error)) => return Err(error.into()),
                Input::Line(Ok(Some(line))) => match self.handle_line(&line).await {
                    Ok(()) => {},
                    Err(error) if error.is_recoverable() => {
                        tracing::warn!(%error, "skipping input line");
                    },
                    Err(error) => return Err(error),
                },
            }
        }

        self.output.flush().await?;
        Ok(self.output)
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), ConsoleError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let Inbound { user_id, command } = Inbound::parse(line)?;
        let event = command.into_event(&self.fetcher).await?;
        tracing::debug!(user_id, event = event.name(), "console input");

        let replies = self.coordinator.handle_event(user_id, event).await?;
        for notification in &replies {
            self.write(&NotificationLine::new(user_id, notification)).await?;
        }
        Ok(())
    }

    async fn write<T: Serialize>(&mut self, value: &T) -> Result<(), ConsoleError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.output.write_all(&line).await?;
        self.output.flush().await?;
        Ok(())
    }
}
