use thiserror::Error;

/// Errors surfaced by a page backend. Expected interaction failures
/// (an element that cannot be resolved) are modeled as `None`/`Failed`
/// values in the protocol layer, not as errors; these variants cover
/// genuine backend faults.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend not ready")]
    NotReady,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Other(String),
}
