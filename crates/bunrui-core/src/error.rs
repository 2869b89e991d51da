use thiserror::Error;

/// Errors that can occur during bunrui core operations.
#[derive(Debug, Error)]
pub enum BunruiError {
    /// A configuration value is missing or unrecognized.
    #[error("configuration error: {0}")]
    Config(String),

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A model collaborator failed while fitting or predicting.
    #[error("model error: {0}")]
    Model(String),

    /// An artifact could not be serialized or deserialized.
    #[error("artifact error: {0}")]
    Artifact(String),
}

/// Result type alias for bunrui operations.
pub type Result<T> = std::result::Result<T, BunruiError>;
