use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Incompatible filters: {0}")]
    Incompatible(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Redis error: {0}")]
    Remote(#[from] redis::RedisError),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// Conversion from serde_json::Error for the JSON envelope
impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        FilterError::Serialization(err.to_string())
    }
}
