// MediaHub Import Error Types

use postgres::error::SqlState;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Source library unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to read source library: {0}")]
    SourceRead(String),

    #[error("Destination catalog unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("Unexpected destination schema: {0}")]
    Schema(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("User not found in destination catalog: {0}")]
    UserNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[source] postgres::Error),

    #[error("{0}")]
    Other(String),
}

impl ImportError {
    /// True for errors that abort a run before the destination was touched.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ImportError::SourceUnavailable(_) | ImportError::DestinationUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                ImportError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => ImportError::Database(err),
        }
    }
}

impl From<postgres::Error> for ImportError {
    fn from(err: postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) if is_integrity_violation(db.code()) => {
                ImportError::ConstraintViolation(db.message().to_string())
            }
            _ => ImportError::Postgres(err),
        }
    }
}

/// SQLSTATE class 23: unique, foreign key, not-null and check violations.
fn is_integrity_violation(state: &SqlState) -> bool {
    state.code().starts_with("23")
}

pub type Result<T> = std::result::Result<T, ImportError>;
