use std::path::PathBuf;

use anyhow::{Context, Result};
use gdocs_client::{
    Authenticator, AuthorizationPrompt, ClientConfig, ClientSecrets, GoogleDocsClient, OAuthFlow,
    Token, TokenStore,
};
use serde::Serialize;
use tracing::{debug, info};

pub mod markdown;
pub mod render;

pub use render::{render, render_document, Block, HeadingLevel, Paragraph, Run};

/// Inputs required to authenticate against and read from the Docs API.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// OAuth client secrets downloaded from the Cloud console.
    pub credentials_path: PathBuf,
    /// Where the OAuth token is cached between runs.
    pub token_path: PathBuf,
    pub client: ClientConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            client: ClientConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDocument {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub markdown: String,
}

#[derive(Debug)]
pub struct Exporter {
    client: GoogleDocsClient,
    authenticator: Authenticator,
}

impl Exporter {
    pub fn new(client: GoogleDocsClient, authenticator: Authenticator) -> Self {
        Self {
            client,
            authenticator,
        }
    }

    /// Makes sure a usable token is cached, running the interactive flow if needed.
    pub async fn authorize(&self, prompt: &dyn AuthorizationPrompt) -> Result<Token> {
        self.authenticator.access_token(prompt).await
    }

    pub async fn export(
        &self,
        document_id: &str,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<ExportedDocument> {
        let token = self.authorize(prompt).await?;
        self.fetch(document_id, &token).await
    }

    /// Retrieves and renders a document with an already obtained token.
    pub async fn fetch(&self, document_id: &str, token: &Token) -> Result<ExportedDocument> {
        let document = self
            .client
            .get_document(document_id, token)
            .await
            .context("unable to retrieve data from document")?;

        let markdown = render_document(&document);
        info!(
            target: "gdocs_core",
            document_id,
            title = document.title.as_deref().unwrap_or_default(),
            bytes = markdown.len(),
            "document rendered"
        );

        Ok(ExportedDocument {
            document_id: document
                .document_id
                .unwrap_or_else(|| document_id.to_string()),
            title: document.title,
            markdown,
        })
    }
}

pub async fn bootstrap(config: ExportConfig) -> Result<Exporter> {
    let secrets = ClientSecrets::from_file(&config.credentials_path).await?;
    let flow = OAuthFlow::new(secrets)?;
    let authenticator = Authenticator::new(flow, TokenStore::new(&config.token_path));
    let client = GoogleDocsClient::with_config(config.client.clone())?;

    debug!(
        target: "gdocs_core",
        credentials = %config.credentials_path.display(),
        token = %config.token_path.display(),
        base_url = %config.client.base_url,
        "exporter initialized"
    );
    Ok(Exporter::new(client, authenticator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn bootstrap_reads_credentials() {
        let dir = tempdir().expect("tempdir");
        let credentials = dir.path().join("credentials.json");
        std::fs::write(
            &credentials,
            br#"{"installed": {"client_id": "id", "client_secret": "secret"}}"#,
        )
        .unwrap();

        let config = ExportConfig {
            credentials_path: credentials,
            token_path: dir.path().join("token.json"),
            ..ExportConfig::default()
        };
        assert!(bootstrap(config).await.is_ok());
    }

    #[tokio::test]
    async fn bootstrap_names_missing_credentials_file() {
        let dir = tempdir().expect("tempdir");
        let config = ExportConfig {
            credentials_path: dir.path().join("absent.json"),
            token_path: dir.path().join("token.json"),
            ..ExportConfig::default()
        };
        let error = bootstrap(config).await.unwrap_err();
        assert!(format!("{error:#}").contains("absent.json"));
    }
}
