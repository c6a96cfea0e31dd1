//! Error types for script and storage operations

use micheline_core::MichelineError;
use thiserror::Error;

/// Errors raised while decoding scripts, linking storage or reading values
#[derive(Error, Debug)]
pub enum ContractError {
    /// Malformed tree or literal
    #[error(transparent)]
    Micheline(#[from] MichelineError),

    /// Script length prefix disagrees with the decoded content
    #[error("micheline: {0}")]
    Framing(String),

    /// Value tree does not follow its type tree
    #[error("storage shape mismatch: {0}")]
    Shape(String),

    /// Path lookup on a typed value failed
    #[error("invalid value path: {0}")]
    Path(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContractError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        ContractError::Shape(msg.into())
    }

    pub(crate) fn framing(msg: impl Into<String>) -> Self {
        ContractError::Framing(msg.into())
    }
}

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, ContractError>;
