use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
