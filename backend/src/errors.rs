use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Store and connection faults; the client may retry these later.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Migration(_) | Error::Store(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
