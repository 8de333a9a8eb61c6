use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
