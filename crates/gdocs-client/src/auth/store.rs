use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use super::Token;

/// Token persistence in a single JSON file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no token has been saved yet.
    pub async fn load(&self) -> Result<Option<Token>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        let data = fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read token file {:?}", self.path))?;
        let token = serde_json::from_slice::<Token>(&data)
            .with_context(|| format!("failed to deserialize token file {:?}", self.path))?;
        Ok(Some(token))
    }

    pub async fn store(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create token dir {parent:?}"))?;
        }

        let payload = serde_json::to_vec_pretty(token)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&self.path)
            .await
            .with_context(|| format!("unable to cache OAuth token at {:?}", self.path))?;
        file.write_all(&payload)
            .await
            .with_context(|| format!("failed to write token file {:?}", self.path))?;
        file.flush().await?;

        debug!(target: "gdocs_client", file = ?self.path, "wrote token file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn sample_token() -> Token {
        Token {
            access_token: "ya29.access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry: Some(datetime!(2030-01-01 00:00 UTC)),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_token_loads_back() {
        let dir = tempdir().expect("tempdir");
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));

        store.store(&sample_token()).await.unwrap();
        let loaded = store.load().await.unwrap().expect("expected token");
        assert_eq!(loaded, sample_token());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let store = TokenStore::new(dir.path().join("token.json"));
        store.store(&sample_token()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("token.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = TokenStore::new(path);
        assert!(store.load().await.is_err());
    }
}
