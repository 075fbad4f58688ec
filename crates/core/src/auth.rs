//! Auth context providers.
//!
//! Before typing the driving command the launcher asks the provider to sync
//! its artifacts, then exports the artifact path into the terminal so the CLI
//! picks up the same credentials.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Failed to sync auth artifact {path}: {source}")]
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;

#[async_trait]
pub trait AuthContextProvider: Send + Sync {
    async fn is_authenticated(&self) -> bool;

    /// File the CLI should read its credentials from.
    fn auth_artifact_path(&self) -> PathBuf;

    /// Refresh the artifact at [`AuthContextProvider::auth_artifact_path`].
    async fn sync_auth_artifacts(&self) -> AuthResult<()>;
}

/// Credentials kept as a file under the config dir.
///
/// With a source configured, syncing copies the source file over the
/// artifact. Without one the artifact is managed externally and syncing only
/// checks that it exists.
#[derive(Debug, Clone)]
pub struct FileAuthProvider {
    artifact_path: PathBuf,
    source_path: Option<PathBuf>,
}

impl FileAuthProvider {
    pub const ARTIFACT_FILE: &'static str = "auth.json";

    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            source_path: None,
        }
    }

    /// Provider storing `auth.json` in `config_dir`.
    pub fn in_config_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(Self::ARTIFACT_FILE))
    }

    pub fn with_source(mut self, source_path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }
}

#[async_trait]
impl AuthContextProvider for FileAuthProvider {
    async fn is_authenticated(&self) -> bool {
        let candidate = self.source_path.as_ref().unwrap_or(&self.artifact_path);
        tokio::fs::try_exists(candidate).await.unwrap_or(false)
    }

    fn auth_artifact_path(&self) -> PathBuf {
        self.artifact_path.clone()
    }

    async fn sync_auth_artifacts(&self) -> AuthResult<()> {
        let Some(source) = &self.source_path else {
            return if tokio::fs::try_exists(&self.artifact_path)
                .await
                .unwrap_or(false)
            {
                Ok(())
            } else {
                Err(AuthError::NotAuthenticated)
            };
        };

        let contents = tokio::fs::read(source)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => AuthError::NotAuthenticated,
                _ => AuthError::Sync {
                    path: source.clone(),
                    source: err,
                },
            })?;

        crate::paths::write_atomic(&self.artifact_path, &contents).map_err(|source| {
            AuthError::Sync {
                path: self.artifact_path.clone(),
                source,
            }
        })?;
        info!(artifact = ?self.artifact_path, "auth artifact synced");
        Ok(())
    }
}

/// Always authenticated; syncing is a no-op. For local development and
/// hosts that manage credentials themselves.
#[derive(Debug, Clone)]
pub struct StaticAuthProvider {
    artifact_path: PathBuf,
}

impl StaticAuthProvider {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
        }
    }
}

#[async_trait]
impl AuthContextProvider for StaticAuthProvider {
    async fn is_authenticated(&self) -> bool {
        true
    }

    fn auth_artifact_path(&self) -> PathBuf {
        self.artifact_path.clone()
    }

    async fn sync_auth_artifacts(&self) -> AuthResult<()> {
        debug!("static auth provider: nothing to sync");
        Ok(())
    }
}
