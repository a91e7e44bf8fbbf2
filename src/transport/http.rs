//! Request/response client for the HTTP facade.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{ErrorBody, RegisterRequest, RegisterResponse, SessionResponse};

use super::client::{Registration, Transport, TransportKind};

// ============================================================================
// HttpTransport
// ============================================================================

/// Stateless transport talking to the facade.
///
/// Every call is an independent request, so this works from serverless
/// hosts and behind proxies that drop long-lived connections.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    /// Creates a transport for the facade at `base_url`.
    ///
    /// `base_url` may include one of the facade's path prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a transport reusing an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `base_url` is not a valid URL.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    /// Returns the facade base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn register_uri(&self, uri: &str) -> Result<Registration> {
        let response = self
            .client
            .post(self.endpoint("register")?)
            .json(&RegisterRequest {
                uri: Some(uri.to_string()),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: RegisterResponse = response.json().await?;
        debug!(session_id = %body.session_id, "Registered over HTTP");

        Ok(Registration {
            session_id: SessionId::new(body.session_id),
            uri: body.uri,
            redirect_url: body.redirect_url,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<String> {
        let mut url = self.endpoint("session")?;
        url.query_pairs_mut().append_pair("sessionId", session_id);

        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(Error::session_not_found(session_id)),
            StatusCode::BAD_REQUEST => return Err(Error::MissingSessionId),
            _ => {}
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: SessionResponse = response.json().await?;
        Ok(body.uri)
    }
}

/// Maps a failed `register` response onto an [`Error`].
async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    };

    match status {
        StatusCode::BAD_REQUEST => Error::invalid_uri(message),
        StatusCode::SERVICE_UNAVAILABLE => Error::config(message),
        _ => Error::connection(format!("facade returned {status}: {message}")),
    }
}

// ============================================================================
// Tests
// ============================================================================
