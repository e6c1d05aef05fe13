//! OAuth2 installed-application flow for the Docs API.
//!
//! The flow mirrors what the Google client libraries do for desktop apps:
//! show an authorization URL, let the user paste back the code, exchange it
//! for a token, and keep that token on disk so later runs can reuse or
//! refresh it without user interaction.

pub mod store;

use std::{path::Path, time::Duration as StdDuration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};

pub use store::TokenStore;

/// Read-only access to document content.
pub const DOCUMENTS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/documents.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const OUT_OF_BAND_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";
const DEFAULT_STATE: &str = "state-token";
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("invalid client secrets: {0}")]
    InvalidSecrets(String),
    #[error("client secrets contain neither an `installed` nor a `web` section")]
    MissingClientSection,
    #[error("authorization code was empty")]
    EmptyCode,
    #[error("token request failed: {0}")]
    Http(String),
    #[error("token endpoint rejected the request ({status}): {message}")]
    TokenEndpoint { status: u16, message: String },
}

/// OAuth client identity, as found in a `credentials.json` downloaded from the Cloud console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecrets {
    pub fn from_json(bytes: &[u8]) -> Result<Self, AuthError> {
        let file: SecretsFile = serde_json::from_slice(bytes)
            .map_err(|error| AuthError::InvalidSecrets(error.to_string()))?;
        file.installed
            .or(file.web)
            .ok_or(AuthError::MissingClientSection)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("unable to read client secret file {}", path.display()))?;
        Self::from_json(&bytes)
            .with_context(|| format!("unable to parse client secret file {}", path.display()))
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map_or(OUT_OF_BAND_REDIRECT, String::as_str)
    }
}

/// Persisted OAuth token. The JSON shape matches the one written by the Go
/// `oauth2` package, so token files produced by other tools load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<OffsetDateTime>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// A token without an expiry (or with Go's zero time) is treated as non-expiring.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.expiry {
            Some(expiry) if expiry.year() > 1 => expiry - EXPIRY_MARGIN <= now,
            _ => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, issued_at: OffsetDateTime, previous_refresh: Option<String>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|seconds| issued_at + Duration::seconds(seconds)),
        }
    }
}

/// Shows the authorization URL to the user and returns the code they paste back.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn request_code(&self, authorization_url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OAuthFlow {
    http: Client,
    secrets: ClientSecrets,
    scope: String,
}

impl OAuthFlow {
    pub fn new(secrets: ClientSecrets) -> Result<Self> {
        let http = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(StdDuration::from_secs(30))
            .build()
            .context("failed to build OAuth HTTP client")?;
        Ok(Self {
            http,
            secrets,
            scope: DOCUMENTS_READONLY_SCOPE.to_string(),
        })
    }

    pub fn authorization_url(&self, state: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", self.secrets.redirect_uri()),
                ("response_type", "code"),
                ("scope", self.scope.as_str()),
                ("state", state),
                ("access_type", "online"),
            ],
        )
        .map_err(|error| AuthError::InvalidSecrets(format!("auth_uri: {error}")).into())
    }

    #[instrument(name = "gdocs_client.exchange_code", skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::EmptyCode.into());
        }
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", self.secrets.redirect_uri()),
        ];
        self.request_token(&params, None).await
    }

    #[instrument(name = "gdocs_client.refresh_token", skip_all)]
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
        ];
        self.request_token(&params, token.refresh_token.clone()).await
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
        previous_refresh: Option<String>,
    ) -> Result<Token> {
        let issued_at = OffsetDateTime::now_utc();
        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|error| AuthError::Http(error.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| AuthError::Http(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<TokenErrorResponse>(&bytes).map_or_else(
                |_| String::from_utf8_lossy(&bytes).trim().to_string(),
                |body| match body.error_description {
                    Some(description) => format!("{}: {description}", body.error),
                    None => body.error,
                },
            );
            warn!(target: "gdocs_client", status = %status, "token request rejected");
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body: TokenResponse =
            serde_json::from_slice(&bytes).context("failed to parse token response")?;
        Ok(body.into_token(issued_at, previous_refresh))
    }
}

/// Produces a usable access token from the on-disk cache, a refresh, or the interactive flow.
#[derive(Debug)]
pub struct Authenticator {
    flow: OAuthFlow,
    store: TokenStore,
}

impl Authenticator {
    pub fn new(flow: OAuthFlow, store: TokenStore) -> Self {
        Self { flow, store }
    }

    pub async fn access_token(&self, prompt: &dyn AuthorizationPrompt) -> Result<Token> {
        let cached = match self.store.load().await {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    target: "gdocs_client",
                    error = %error,
                    path = %self.store.path().display(),
                    "ignoring unreadable token file"
                );
                None
            }
        };

        if let Some(token) = cached {
            if !token.is_expired(OffsetDateTime::now_utc()) {
                debug!(target: "gdocs_client", "using cached token");
                return Ok(token);
            }
            if token.can_refresh() {
                match self.flow.refresh(&token).await {
                    Ok(refreshed) => {
                        self.store.store(&refreshed).await?;
                        debug!(target: "gdocs_client", "refreshed expired token");
                        return Ok(refreshed);
                    }
                    Err(error) => warn!(
                        target: "gdocs_client",
                        error = %error,
                        "token refresh failed; falling back to interactive authorization"
                    ),
                }
            }
        }

        let token = self.authorize_interactively(prompt).await?;
        self.store.store(&token).await?;
        info!(
            target: "gdocs_client",
            path = %self.store.path().display(),
            "saved credential file"
        );
        Ok(token)
    }

    async fn authorize_interactively(&self, prompt: &dyn AuthorizationPrompt) -> Result<Token> {
        let url = self.flow.authorization_url(DEFAULT_STATE)?;
        let code = prompt
            .request_code(url.as_str())
            .await
            .context("unable to read authorization code")?;
        self.flow
            .exchange_code(&code)
            .await
            .context("unable to retrieve token from web")
    }
}
