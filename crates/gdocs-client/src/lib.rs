pub mod auth;
pub mod types;

pub use auth::{
    AuthError, Authenticator, AuthorizationPrompt, ClientSecrets, OAuthFlow, Token, TokenStore,
};

use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::types::{ApiErrorEnvelope, Document};

const BASE_URL: &str = "https://docs.googleapis.com/v1";
pub(crate) const USER_AGENT: &str = concat!("gdocs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("unexpected status code {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("missing document id")]
    MissingDocumentId,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: StdDuration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            timeout: StdDuration::from_secs(30),
        }
    }
}

/// Read-only client for the Docs API `documents.get` endpoint.
#[derive(Debug)]
pub struct GoogleDocsClient {
    http: Client,
    config: ClientConfig,
}

impl GoogleDocsClient {
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { http, config })
    }

    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// URL of a single document; the id is encoded as one path segment.
    pub fn document_url(&self, document_id: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(self.config.base_url.trim_end_matches('/'))
            .map_err(|error| ClientError::InvalidBaseUrl(error.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidBaseUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .push("documents")
            .push(document_id);
        Ok(url)
    }

    #[instrument(name = "gdocs_client.get_document", skip(self, token))]
    pub async fn get_document(&self, document_id: &str, token: &Token) -> Result<Document> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(ClientError::MissingDocumentId.into());
        }

        let url = self.document_url(document_id)?;
        let response = self
            .http
            .get(url.clone())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", token.token_type, token.access_token),
            )
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;

        if !status.is_success() {
            warn!(status = %status, url = %url, "Docs API request failed");
            return Err(ClientError::Status {
                status,
                message: api_error_message(&bytes),
            }
            .into());
        }

        let document = serde_json::from_slice::<Document>(&bytes)
            .with_context(|| format!("failed to parse document json from {url}"))?;
        debug!(
            document_id,
            elements = document.content().len(),
            "document retrieved"
        );
        Ok(document)
    }
}

fn api_error_message(bytes: &[u8]) -> String {
    match serde_json::from_slice::<ApiErrorEnvelope>(bytes) {
        Ok(envelope) => envelope
            .error
            .message
            .or(envelope.error.status)
            .unwrap_or_else(|| "unknown error".to_string()),
        Err(_) => String::from_utf8_lossy(bytes).trim().to_string(),
    }
}
