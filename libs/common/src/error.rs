//! Infrastructure errors shared by every service
//!
//! Domain code wraps these rather than leaking `sqlx` types upward.

use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Pool could not be opened or the server is unreachable
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    #[error("Database migration error: {0}")]
    Migration(String),

    /// Missing or unparsable `DATABASE_*` variable
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// A stored value could not be mapped back to its domain type
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
