use thiserror::Error;
use tracing::error;

/// An error from an operation on a `ContentDb`.
#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("An error from the underlying database: {0:?}")]
    Database(String),

    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),

    /// Unable to store or retrieve data because it is invalid.
    #[error("data invalid {message}")]
    InvalidData { message: String },

    #[error("rusqlite error {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("r2d2 error {0}")]
    R2D2(#[from] r2d2::Error),
}

/// Aborts on an unrecoverable backend failure. There is no local recovery
/// path for a corrupt or full store.
pub(crate) fn fatal_database_error(err: ContentStoreError) -> ! {
    error!(%err, "Unrecoverable content database failure");
    panic!("database broken or disk full: {err}");
}
