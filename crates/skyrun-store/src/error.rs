//! Config store error types.

/// Errors produced by [`ConfigStore`](crate::ConfigStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File-system I/O failure (e.g. creating the config directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file exists but does not parse.
    #[error("config file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No home directory and no explicit path were available.
    #[error("cannot locate a home directory for the config file")]
    NoHomeDir,

    /// Internal mutex was poisoned by a panicked thread.
    #[error("config store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for skyrun_types::Error {
    fn from(e: StoreError) -> Self {
        skyrun_types::Error::Store(e.to_string())
    }
}
