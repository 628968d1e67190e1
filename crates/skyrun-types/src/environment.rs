//! Per-environment configuration record.
//!
//! One record per named environment, persisted by the config store.
//! Every provider identifier is optional so a partially provisioned
//! environment can be saved after each step and resumed later.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fallback region when neither the process environment nor the stored
/// config names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default environment name used when the caller does not pass one.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Provider identifiers for one named environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_function_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
    /// Set once every provisioning step has completed.
    #[serde(default)]
    pub initialized: bool,
}

impl EnvironmentConfig {
    /// Fail unless the environment finished provisioning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `initialized` is false.
    pub fn require_initialized(&self, environment: &str) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::Configuration {
                environment: environment.to_string(),
                message: "not initialized; run setup first".into(),
            })
        }
    }

    /// Extract a required field, naming it in the error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the field is `None`.
    pub fn require<'a>(&self, environment: &str, field: &str, value: &'a Option<String>) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| Error::Configuration {
            environment: environment.to_string(),
            message: format!("missing '{}'; run setup first", field),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_uninitialized() {
        let cfg = EnvironmentConfig::default();
        assert!(!cfg.initialized);
        assert!(cfg.require_initialized("dev").is_err());
    }

    #[test]
    fn test_require_initialized_passes_when_set() {
        let cfg = EnvironmentConfig { initialized: true, ..Default::default() };
        assert!(cfg.require_initialized("dev").is_ok());
    }

    #[test]
    fn test_require_names_environment_and_field() {
        let cfg = EnvironmentConfig::default();
        let err = cfg.require("staging", "cluster", &cfg.cluster).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("staging"));
        assert!(msg.contains("cluster"));
    }

    #[test]
    fn test_require_returns_value_when_present() {
        let cfg = EnvironmentConfig { bucket: Some("skyrun-abc".into()), ..Default::default() };
        assert_eq!(cfg.require("dev", "bucket", &cfg.bucket).unwrap(), "skyrun-abc");
    }

    #[test]
    fn test_serde_skips_absent_fields() {
        let json = serde_json::to_string(&EnvironmentConfig::default()).unwrap();
        assert_eq!(json, "{\"initialized\":false}");
    }

    #[test]
    fn test_serde_roundtrip() {
        let cfg = EnvironmentConfig {
            region: Some("eu-west-1".into()),
            bucket: Some("skyrun-123".into()),
            initialized: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EnvironmentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
