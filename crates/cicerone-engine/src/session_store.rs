//! On-disk persistence of the active guide session, so an interrupted
//! guide can be offered for resumption on the next run.

use cicerone_common::protocol::{SessionCredentials, Step};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything needed to resume a guide: credentials, the instructions
/// that started it, and the step list as last known. The planner asks
/// the model to re-validate the steps against the live page on resume,
/// so a slightly stale step list is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGuide {
    pub credentials: SessionCredentials,
    pub instructions: String,
    pub steps: Vec<Step>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.cicerone/session.json`, when a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cicerone").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, guide: &StoredGuide) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(guide)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<StoredGuide>, SessionStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn clear(&self) -> Result<(), SessionStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
