use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TracerError>;
