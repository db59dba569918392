//! Error types for the local stores.

use thiserror::Error;

/// Failure of a local archive/preference operation. Callers surface these as a
/// generic user-facing apology and leave prior state unchanged.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The underlying Sled store failed (open, read, write, or clear).
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    /// A stored or imported record could not be (de)serialized.
    #[error("record serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// An import payload was not a JSON array of message objects.
    #[error("import payload is not a message array")]
    ImportFormat,
}
