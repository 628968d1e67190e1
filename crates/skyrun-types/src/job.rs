//! Job requests, packaged artifacts, scheduled jobs, and task runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceSpec;
use crate::schedule::ScheduleExpression;

/// Current version of the trigger payload contract.
pub const TRIGGER_PAYLOAD_VERSION: u32 = 1;

/// One-off job submission request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Local script file or directory to package.
    pub script: PathBuf,
    /// Optional entry function inside the script.
    pub method: Option<String>,
    /// Optional JSON parameters passed to the entry function.
    pub params: Option<serde_json::Value>,
    pub resources: ResourceSpec,
    /// Run on spot capacity instead of on-demand.
    pub use_spot: bool,
    pub environment: String,
    /// Override the environment's log group for this run.
    pub log_group: Option<String>,
    /// Extra exclude patterns applied when packaging, on top of the
    /// defaults.
    pub excludes: Vec<String>,
}

impl JobRequest {
    pub fn new(script: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            method: None,
            params: None,
            resources: ResourceSpec::default(),
            use_spot: false,
            environment: environment.into(),
            log_group: None,
            excludes: Vec::new(),
        }
    }
}

/// A code bundle uploaded to the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    /// Path that was packaged.
    pub local_path: PathBuf,
    pub bucket: String,
    /// Object key; unique per upload.
    pub key: String,
    pub size_bytes: u64,
}

/// Recurring job as recorded in the trigger payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub name: String,
    pub script: PathBuf,
    pub schedule: ScheduleExpression,
    pub resources: ResourceSpec,
    pub use_spot: bool,
    pub method: Option<String>,
    pub params: Option<serde_json::Value>,
    pub environment: String,
    /// Object key of the packaged code.
    pub key: String,
    /// Trigger rule identifier returned by the provider.
    pub trigger_arn: String,
}

/// Versioned JSON payload attached to a trigger. The scheduler function
/// launches the task from exactly these fields, so the contract must
/// stay readable by already-deployed functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub version: u32,
    pub name: String,
    pub environment: String,
    pub bucket: String,
    pub key: String,
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub vcpus: f64,
    pub memory_mb: u32,
    pub use_spot: bool,
}

/// Lifecycle state reported by the compute provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Provisioning,
    Pending,
    Running,
    Stopped,
    /// Provider status outside the known set, passed through verbatim.
    Other(String),
}

impl TaskStatus {
    /// Map a provider status string onto the known set.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "PROVISIONING" => Self::Provisioning,
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "STOPPED" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => f.write_str("PROVISIONING"),
            Self::Pending => f.write_str("PENDING"),
            Self::Running => f.write_str("RUNNING"),
            Self::Stopped => f.write_str("STOPPED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// One observed task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    /// Short task identifier (last ARN segment).
    pub id: String,
    pub status: TaskStatus,
    /// Script the task was launched with, when recoverable from the
    /// container command.
    pub script: Option<String>,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: Option<i64>,
}
