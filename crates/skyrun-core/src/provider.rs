//! Provider ports.
//!
//! Trait seams in front of every external system the orchestrators
//! touch. The AWS adapters live in `skyrun-aws`; tests use in-memory
//! fakes. All traits are object-safe and `Send + Sync` for use behind
//! `Arc<dyn _>`.

use async_trait::async_trait;
use skyrun_types::{LogEvent, Result, ScheduleExpression, TaskRun};

/// Object storage for code bundles.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool>;
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
    /// Delete every object; the bucket itself stays.
    async fn purge_bucket(&self, bucket: &str) -> Result<()>;
    /// Delete the (empty) bucket. Absent bucket is [`Error::NotFound`](skyrun_types::Error::NotFound).
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

/// Task definition parameters registered once per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionSpec {
    pub family: String,
    /// Container image reference (repository URI plus tag).
    pub image: String,
    pub role_arn: String,
    pub log_group: String,
    pub region: String,
    /// Baseline size; dispatch overrides per run.
    pub cpu_units: u32,
    pub memory_mb: u32,
}

/// Capacity class for one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    OnDemand,
    Spot,
}

/// Everything needed to launch one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub cluster: String,
    pub task_definition_arn: String,
    pub subnet_id: String,
    pub cpu_units: u32,
    pub memory_mb: u32,
    /// Positional container command: bucket, object key, script,
    /// then optionally entry method and JSON params.
    pub command: Vec<String>,
    pub capacity: Capacity,
    /// Per-run log group override.
    pub log_group: Option<String>,
}

/// Serverless container compute plus the identities it runs as.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn ensure_cluster(&self, name: &str) -> Result<String>;
    async fn delete_cluster(&self, name: &str) -> Result<()>;

    /// Create the image repository if absent; returns its URI.
    async fn ensure_repository(&self, name: &str) -> Result<String>;
    async fn delete_repository(&self, name: &str) -> Result<()>;

    /// Create the task execution role if absent; returns its ARN.
    async fn ensure_task_role(&self, name: &str) -> Result<String>;
    async fn delete_task_role(&self, name: &str) -> Result<()>;

    /// Discover the account's default `(vpc id, subnet id)`.
    async fn default_network(&self) -> Result<(String, String)>;
    /// Check that `subnet_id` belongs to `vpc_id`.
    async fn validate_network(&self, vpc_id: &str, subnet_id: &str) -> Result<()>;

    /// Register (or re-register) the task definition; returns its ARN.
    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> Result<String>;
    async fn deregister_task_family(&self, family: &str) -> Result<()>;

    /// Submit one task; returns the short task id.
    async fn run_task(&self, spec: &LaunchSpec) -> Result<String>;
    async fn list_tasks(&self, cluster: &str) -> Result<Vec<TaskRun>>;
    async fn stop_task(&self, cluster: &str, task_id: &str) -> Result<()>;
}

/// One trigger rule as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRule {
    pub name: String,
    pub arn: String,
    /// Raw schedule expression in the provider grammar.
    pub schedule: String,
    /// Target input payload, when one is attached.
    pub payload: Option<String>,
}

/// Scheduled triggers plus the function they invoke.
#[async_trait]
pub trait TriggerProvider: Send + Sync {
    /// Deploy (or update) the invoker function; returns its ARN.
    /// `env_vars` become the function's environment.
    async fn ensure_invoker(
        &self,
        name: &str,
        role_arn: &str,
        env_vars: &[(String, String)],
    ) -> Result<String>;
    async fn delete_invoker(&self, name: &str) -> Result<()>;

    /// Create or replace a trigger rule; returns its ARN.
    async fn put_trigger(
        &self,
        name: &str,
        schedule: &ScheduleExpression,
        payload: &str,
        target_arn: &str,
    ) -> Result<String>;
    async fn trigger_exists(&self, name: &str) -> Result<bool>;
    async fn list_triggers(&self, prefix: &str) -> Result<Vec<TriggerRule>>;
    /// Remove the rule and its targets. Absent rule is
    /// [`Error::NotFound`](skyrun_types::Error::NotFound).
    async fn delete_trigger(&self, name: &str) -> Result<()>;
}

/// One query against a log group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub group: String,
    /// Inclusive lower bound, epoch milliseconds.
    pub start_ms: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds.
    pub end_ms: Option<i64>,
    /// Provider-side filter pattern.
    pub filter: Option<String>,
    /// Continuation token from the previous page.
    pub next_token: Option<String>,
}

/// One page of log events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub events: Vec<LogEvent>,
    pub next_token: Option<String>,
}

/// Centralized task log storage.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn ensure_group(&self, group: &str) -> Result<()>;
    async fn delete_group(&self, group: &str) -> Result<()>;
    async fn query(&self, query: &LogQuery) -> Result<LogPage>;
}

/// Builds the executor image and pushes it to a repository.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// `extra_commands` are appended to the image build, in order.
    async fn build_and_push(
        &self,
        repository_uri: &str,
        region: &str,
        extra_commands: &[String],
    ) -> Result<()>;
}
