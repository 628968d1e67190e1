//! JSON file backend for environment records.
//!
//! Persists a single document of the form
//! `{ "environments": { "<name>": { ... } } }` at
//! `~/.skyrun/config.json` by default. Writes are whole-file, pretty
//! printed, with parent directories created on demand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use skyrun_types::EnvironmentConfig;

use crate::backend::ConfigStore;
use crate::error::{Result, StoreError};

const CONFIG_DIR: &str = ".skyrun";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    environments: BTreeMap<String, EnvironmentConfig>,
}

/// File-backed [`ConfigStore`].
///
/// The mutex serializes read-modify-write cycles within one process;
/// the file itself is the source of truth between processes.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store at the default location, `~/.skyrun/config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoHomeDir`] when no home directory can be
    /// determined.
    pub fn at_default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or(StoreError::NoHomeDir)?;
        Ok(Self::at_path(home.join(CONFIG_DIR).join(CONFIG_FILE)))
    }

    /// Store at an explicit path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<ConfigDocument> {
        if !self.path.exists() {
            return Ok(ConfigDocument::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_document(&self, doc: &ConfigDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(doc)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn load_environment(&self, name: &str) -> Result<Option<EnvironmentConfig>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.read_document()?.environments.remove(name))
    }

    fn save_environment(&self, name: &str, config: &EnvironmentConfig) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut doc = self.read_document()?;
        doc.environments.insert(name.to_string(), config.clone());
        self.write_document(&doc)
    }

    fn clear_environment(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut doc = self.read_document()?;
        if doc.environments.remove(name).is_some() {
            self.write_document(&doc)?;
        }
        Ok(())
    }

    fn list_environments(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.read_document()?.environments.keys().cloned().collect())
    }
}
