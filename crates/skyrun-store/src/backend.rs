//! Config store trait definition.
//!
//! [`ConfigStore`] defines the persistence contract for per-environment
//! provider identifiers. Model types live in
//! [`skyrun_types::environment`].

use skyrun_types::EnvironmentConfig;

use crate::error;

/// Persistence contract for environment records.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn ConfigStore>`.
pub trait ConfigStore: Send + Sync {
    /// Read one environment record.
    ///
    /// Returns `Ok(None)` when the environment has never been saved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on storage failure.
    fn load_environment(&self, name: &str) -> error::Result<Option<EnvironmentConfig>>;

    /// Upsert one environment record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on storage failure.
    fn save_environment(&self, name: &str, config: &EnvironmentConfig) -> error::Result<()>;

    /// Remove one environment record. Removing an absent record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on storage failure.
    fn clear_environment(&self, name: &str) -> error::Result<()>;

    /// Names of every stored environment, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) on storage failure.
    fn list_environments(&self) -> error::Result<Vec<String>>;
}
