//! Contact files behind a link.
//!
//! Users may paste a link to a contact file instead of uploading it. The
//! fetched bytes and the server's content type go through the same checks as
//! an upload. `application/octet-stream`, which file hosts commonly send for
//! `.vcf` files, counts as no declared type.

use std::time::Duration;

use reqwest::{Client, Url, header::CONTENT_TYPE};

use crate::ConsoleError;

/// Largest contact file accepted from a link.
pub const MAX_CONTACT_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Default bound on one fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Contact file downloaded from a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Response body.
    pub bytes: Vec<u8>,
    /// Media type the server declared, without parameters.
    pub mime_type: Option<String>,
}

/// Downloads contact files over HTTP(S).
#[derive(Debug, Clone)]
pub struct ContactFetcher {
    client: Client,
    limit: usize,
}

impl Default for ContactFetcher {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

impl ContactFetcher {
    /// Fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ConsoleError> {
        let client = Client::builder().timeout(timeout).build().map_err(ConsoleError::Client)?;
        Ok(Self::with_client(client))
    }

    /// Fetcher using a shared HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client, limit: MAX_CONTACT_FILE_BYTES }
    }

    /// Lower the size limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Download the file at `link`.
    ///
    /// # Errors
    ///
    /// - `ConsoleError::NotALink` unless `link` is an `http` or `https` URL
    /// - `ConsoleError::FetchStatus` on a non-success response
    /// - `ConsoleError::FetchTooLarge` if the body exceeds the size limit
    /// - `ConsoleError::Fetch` if the request itself fails
    pub async fn fetch(&self, link: &str) -> Result<FetchedFile, ConsoleError> {
        let url = Url::parse(link.trim()).map_err(|_| ConsoleError::NotALink(link.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConsoleError::NotALink(link.to_string()));
        }

        let fetch_error = |source| ConsoleError::Fetch { url: url.to_string(), source };
        let response = self.client.get(url.clone()).send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsoleError::FetchStatus { url: url.to_string(), status: status.as_u16() });
        }

        let too_large = || ConsoleError::FetchTooLarge { url: url.to_string(), limit: self.limit };
        if response.content_length().is_some_and(|len| len > self.limit as u64) {
            return Err(too_large());
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(declared_type);
        let bytes = response.bytes().await.map_err(fetch_error)?;
        if bytes.len() > self.limit {
            return Err(too_large());
        }

        tracing::info!(%url, bytes = bytes.len(), ?mime_type, "contact file fetched");
        Ok(FetchedFile { bytes: bytes.to_vec(), mime_type })
    }
}

/// Media type without parameters; generic binary counts as undeclared.
fn declared_type(header: &str) -> Option<String> {
    let essence = header.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "" | "application/octet-stream" => None,
        _ => Some(essence),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    const CARD: &str = "BEGIN:VCARD\nFN:Alice\nTEL:+15551234567\nEND:VCARD\n";

    async fn serve(route: &str, response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path(route)).respond_with(response).mount(&server).await;
        server
    }

    #[test]
    fn declared_type_drops_parameters_and_generic_binary() {
        assert_eq!(declared_type("text/vcard; charset=utf-8"), Some("text/vcard".into()));
        assert_eq!(declared_type("Text/X-VCard"), Some("text/x-vcard".into()));
        assert_eq!(declared_type("application/octet-stream"), None);
        assert_eq!(declared_type(""), None);
    }

    #[tokio::test]
    async fn fetches_body_and_content_type() {
        let response = ResponseTemplate::new(200).set_body_raw(CARD, "text/vcard; charset=utf-8");
        let server = serve("/contacts.vcf", response).await;

        let fetched = ContactFetcher::default()
            .fetch(&format!("{}/contacts.vcf", server.uri()))
            .await
            .unwrap();

        assert_eq!(fetched.bytes, CARD.as_bytes());
        assert_eq!(fetched.mime_type.as_deref(), Some("text/vcard"));
    }

    #[tokio::test]
    async fn generic_binary_is_left_undeclared() {
        let response = ResponseTemplate::new(200).set_body_raw(CARD, "application/octet-stream");
        let server = serve("/ytnuy2.vcf", response).await;

        let fetched =
            ContactFetcher::default().fetch(&format!("{}/ytnuy2.vcf", server.uri())).await.unwrap();

        assert_eq!(fetched.mime_type, None);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = serve("/gone.vcf", ResponseTemplate::new(404)).await;

        let err = ContactFetcher::default()
            .fetch(&format!("{}/gone.vcf", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, ConsoleError::FetchStatus { status: 404, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let response = ResponseTemplate::new(200).set_body_raw(CARD, "text/vcard");
        let server = serve("/big.vcf", response).await;

        let err = ContactFetcher::default()
            .with_limit(8)
            .fetch(&format!("{}/big.vcf", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, ConsoleError::FetchTooLarge { limit: 8, .. }));
    }

    #[tokio::test]
    async fn only_web_links_are_fetched() {
        let fetcher = ContactFetcher::default();

        for link in ["ftp://example.com/contacts.vcf", "contacts.vcf", "file:///etc/passwd"] {
            let err = fetcher.fetch(link).await.unwrap_err();
            assert!(matches!(err, ConsoleError::NotALink(_)), "{link}");
        }
    }
}
