use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("unknown quota resources {0:?}")]
    ResourceUnknown(Vec<String>),
    #[error("quota exceeded for resources {0:?}")]
    OverQuota(Vec<String>),
    #[error("quota driver unavailable: {0}")]
    DriverUnavailable(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
