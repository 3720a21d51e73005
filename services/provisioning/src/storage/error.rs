use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("domain {0} could not be found")]
    DomainNotFound(String),
    #[error("domain {0} already exists")]
    DomainAlreadyExists(String),
    #[error("domain {0} still has subscribers")]
    DomainInUse(String),
    #[error("subscriber {0} could not be found")]
    SubscriberNotFound(String),
    #[error("a subscriber with username {username} and domain {domain_id} already exists")]
    SubscriberAlreadyExists { username: String, domain_id: String },
    #[error("invalid quota value: {0}")]
    InvalidQuotaValue(String),
    #[error("connection poisoned")]
    ConnectionPoisoned,
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl StorageError {
    pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
