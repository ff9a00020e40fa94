//! Bearer tokens for the Key Vault REST API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::KmsError;

/// Supplies the bearer token attached to each Key Vault request.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Current access token.
    async fn access_token(&self) -> Result<SecretString, KmsError>;
}

/// Reads the token from a file on every call.
///
/// Whatever writes the file (a workload identity sidecar, a projected
/// volume) owns rotation.
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Provider reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Token file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AccessTokenProvider for FileTokenProvider {
    async fn access_token(&self) -> Result<SecretString, KmsError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            KmsError::unauthenticated(format!(
                "cannot read access token file {}: {err}",
                self.path.display()
            ))
        })?;

        let token = contents.trim();
        if token.is_empty() {
            return Err(KmsError::unauthenticated(format!(
                "access token file {} is empty",
                self.path.display()
            )));
        }
        Ok(SecretString::from(token.to_owned()))
    }
}

/// Fixed token.
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    /// Provider always returning `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString, KmsError> {
        Ok(SecretString::from(self.token.expose_secret().to_owned()))
    }
}
