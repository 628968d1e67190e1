//! In-memory backend, used by tests and the integration fakes.

use std::collections::BTreeMap;
use std::sync::Mutex;

use skyrun_types::EnvironmentConfig;

use crate::backend::ConfigStore;
use crate::error::{Result, StoreError};

/// Volatile [`ConfigStore`] with the same semantics as the file backend.
#[derive(Default)]
pub struct MemoryStore {
    environments: Mutex<BTreeMap<String, EnvironmentConfig>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn load_environment(&self, name: &str) -> Result<Option<EnvironmentConfig>> {
        let map = self.environments.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(name).cloned())
    }

    fn save_environment(&self, name: &str, config: &EnvironmentConfig) -> Result<()> {
        let mut map = self.environments.lock().map_err(|_| StoreError::LockPoisoned)?;
        map.insert(name.to_string(), config.clone());
        Ok(())
    }

    fn clear_environment(&self, name: &str) -> Result<()> {
        let mut map = self.environments.lock().map_err(|_| StoreError::LockPoisoned)?;
        map.remove(name);
        Ok(())
    }

    fn list_environments(&self) -> Result<Vec<String>> {
        let map = self.environments.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_list() {
        let store = MemoryStore::new();
        assert!(store.load_environment("dev").unwrap().is_none());

        let cfg = EnvironmentConfig { initialized: true, ..Default::default() };
        store.save_environment("dev", &cfg).unwrap();
        store.save_environment("prod", &EnvironmentConfig::default()).unwrap();

        assert_eq!(store.load_environment("dev").unwrap(), Some(cfg));
        assert_eq!(store.list_environments().unwrap(), vec!["dev", "prod"]);

        store.clear_environment("dev").unwrap();
        assert!(store.load_environment("dev").unwrap().is_none());
    }
}
