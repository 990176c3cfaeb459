use thiserror::Error;

use registrar_core::domain::request::RequestId;
use registrar_core::store::StoreError;

pub mod request;

pub use request::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("request `{0}` already exists")]
    Duplicate(RequestId),
    #[error("request `{0}` not found")]
    Missing(RequestId),
    #[error("request `{id}` is at version {actual}, expected {expected}")]
    StaleVersion { id: RequestId, expected: u64, actual: u64 },
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(detail) => StoreError::Decode(detail),
            RepositoryError::Encode(detail) => StoreError::Backend(detail),
            RepositoryError::Duplicate(id) => StoreError::AlreadyExists(id),
            RepositoryError::Missing(id) => StoreError::NotFound(id),
            RepositoryError::StaleVersion { id, expected, actual } => {
                StoreError::VersionConflict { id, expected, actual }
            }
        }
    }
}
