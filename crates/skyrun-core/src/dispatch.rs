//! One-off job dispatch.
//!
//! Validate, package, submit once. The submit call is never retried:
//! a task may have started even when the provider reports an error, so
//! firing twice is worse than surfacing the failure.

use std::sync::Arc;

use skyrun_store::ConfigStore;
use skyrun_types::{EnvironmentConfig, Error, JobRequest, Result, TaskRun};

use crate::packager::CodePackager;
use crate::provider::{Capacity, ComputeProvider, LaunchSpec};

/// Prefix of every job id returned to callers.
pub const JOB_ID_PREFIX: &str = "job-";

/// Submits one-off jobs and exposes task passthroughs.
pub struct JobDispatcher {
    store: Arc<dyn ConfigStore>,
    compute: Arc<dyn ComputeProvider>,
    packager: CodePackager,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        compute: Arc<dyn ComputeProvider>,
        packager: CodePackager,
    ) -> Self {
        Self { store, compute, packager }
    }

    /// Package the request's code, upload it, and submit exactly one
    /// task. Returns the job id (`job-` plus the provider task id).
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a bad resource pair and
    /// [`Error::Configuration`] for an unusable environment, both
    /// before anything is uploaded; [`Error::Dispatch`] when the
    /// provider rejects the submission.
    pub async fn run(&self, request: &JobRequest) -> Result<String> {
        request.resources.validate()?;
        let environment = &request.environment;
        let config = self.load_config(environment)?;
        config.require_initialized(environment)?;

        let bucket = config.require(environment, "bucket", &config.bucket)?;
        let cluster = config.require(environment, "cluster", &config.cluster)?;
        let task_definition_arn =
            config.require(environment, "task_definition_arn", &config.task_definition_arn)?;
        let subnet_id = config.require(environment, "subnet_id", &config.subnet_id)?;

        let stem = script_stem(request)?;
        let key_prefix = format!("jobs/{environment}/{stem}");
        let artifact = self
            .packager
            .package_and_upload(&request.script, bucket, &key_prefix, &request.excludes)
            .await?;

        let spec = LaunchSpec {
            cluster: cluster.to_string(),
            task_definition_arn: task_definition_arn.to_string(),
            subnet_id: subnet_id.to_string(),
            cpu_units: request.resources.cpu_units(),
            memory_mb: request.resources.memory_mb,
            command: container_command(request, &artifact.bucket, &artifact.key)?,
            capacity: if request.use_spot { Capacity::Spot } else { Capacity::OnDemand },
            log_group: request.log_group.clone(),
        };

        tracing::info!(
            environment,
            script = %request.script.display(),
            key = %artifact.key,
            spot = request.use_spot,
            "submitting job"
        );
        // Single submission, no retry.
        let task_id = self
            .compute
            .run_task(&spec)
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        let job_id = format!("{JOB_ID_PREFIX}{task_id}");
        tracing::info!(environment, job_id = %job_id, "job submitted");
        Ok(job_id)
    }

    /// Tasks currently known to the environment's cluster.
    pub async fn list_tasks(&self, environment: &str) -> Result<Vec<TaskRun>> {
        let config = self.load_config(environment)?;
        let cluster = config.require(environment, "cluster", &config.cluster)?;
        self.compute.list_tasks(cluster).await
    }

    /// Stop one task. Accepts either the bare task id or a job id.
    pub async fn stop_task(&self, environment: &str, id: &str) -> Result<()> {
        let config = self.load_config(environment)?;
        let cluster = config.require(environment, "cluster", &config.cluster)?;
        let task_id = id.strip_prefix(JOB_ID_PREFIX).unwrap_or(id);
        self.compute.stop_task(cluster, task_id).await
    }

    fn load_config(&self, environment: &str) -> Result<EnvironmentConfig> {
        self.store
            .load_environment(environment)?
            .ok_or_else(|| Error::Configuration {
                environment: environment.to_string(),
                message: "not initialized; run setup first".into(),
            })
    }
}

fn script_stem(request: &JobRequest) -> Result<String> {
    request
        .script
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Validation(format!("script path '{}' has no name", request.script.display()))
        })
}

/// Positional command consumed by the executor image: bucket, key,
/// script name, then optionally the entry method and its JSON params.
fn container_command(request: &JobRequest, bucket: &str, key: &str) -> Result<Vec<String>> {
    let script_name = request
        .script
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Validation(format!("script path '{}' has no name", request.script.display()))
        })?;

    let mut command = vec![bucket.to_string(), key.to_string(), script_name];
    match (&request.method, &request.params) {
        (Some(method), Some(params)) => {
            command.push(method.clone());
            command.push(serde_json::to_string(params)?);
        }
        (Some(method), None) => command.push(method.clone()),
        (None, Some(_)) => {
            return Err(Error::Validation("params require a method to call".into()));
        }
        (None, None) => {}
    }
    Ok(command)
}
