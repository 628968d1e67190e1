//! Environment provisioning and teardown.
//!
//! `provision` runs a fixed sequence of idempotent `ensure_*` steps and
//! saves the environment config after each one, so a failed run can be
//! re-run and resumes at the failed step. `teardown` walks the same
//! sequence in reverse and treats absent resources as already deleted.

use std::sync::Arc;

use skyrun_store::{resolve_region, ConfigStore};
use skyrun_types::{EnvironmentConfig, Error, ProvisionStep, Result};
use uuid::Uuid;

use crate::provider::{
    ComputeProvider, ImageBuilder, LogStore, ObjectStore, TaskDefinitionSpec, TriggerProvider,
};

/// Baseline task definition size; every dispatch overrides it.
const BASELINE_CPU_UNITS: u32 = 256;
const BASELINE_MEMORY_MB: u32 = 512;

/// Caller inputs for `provision`.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    /// Region override; otherwise resolved from the process environment
    /// and the stored config.
    pub region: Option<String>,
    /// Use an existing VPC instead of the account default. Must be
    /// given together with `subnet_id`.
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    /// Extra commands appended to the executor image build.
    pub build_commands: Vec<String>,
}

/// Provisions and tears down per-environment infrastructure.
pub struct InfrastructureManager {
    store: Arc<dyn ConfigStore>,
    objects: Arc<dyn ObjectStore>,
    compute: Arc<dyn ComputeProvider>,
    triggers: Arc<dyn TriggerProvider>,
    logs: Arc<dyn LogStore>,
    images: Arc<dyn ImageBuilder>,
}

/// Deterministic resource names for one environment. The bucket is the
/// exception: object store names are globally unique, so it gets a
/// random suffix on first provision and is then pinned in the config.
pub fn cluster_name(environment: &str) -> String {
    format!("skyrun-{environment}")
}

pub fn task_role_name(environment: &str) -> String {
    format!("skyrun-{environment}-task-role")
}

pub fn repository_name(environment: &str) -> String {
    format!("skyrun-{environment}-executor")
}

pub fn task_family(environment: &str) -> String {
    format!("skyrun-{environment}-task")
}

pub fn log_group_name(environment: &str) -> String {
    format!("/skyrun/{environment}")
}

pub fn invoker_name(environment: &str) -> String {
    format!("skyrun-{environment}-scheduler")
}

impl InfrastructureManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        objects: Arc<dyn ObjectStore>,
        compute: Arc<dyn ComputeProvider>,
        triggers: Arc<dyn TriggerProvider>,
        logs: Arc<dyn LogStore>,
        images: Arc<dyn ImageBuilder>,
    ) -> Self {
        Self { store, objects, compute, triggers, logs, images }
    }

    /// Provision every resource the environment needs.
    ///
    /// Safe to re-run: existing resources are kept as-is and missing
    /// ones created.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for inconsistent options (before any
    /// provider call); [`Error::Provisioning`] naming the failed step.
    pub async fn provision(
        &self,
        environment: &str,
        opts: &ProvisionOptions,
    ) -> Result<EnvironmentConfig> {
        if opts.vpc_id.is_some() != opts.subnet_id.is_some() {
            return Err(Error::Validation(
                "vpc id and subnet id must be given together".into(),
            ));
        }

        let mut config = self
            .store
            .load_environment(environment)?
            .unwrap_or_default();
        let region = opts
            .region
            .clone()
            .unwrap_or_else(|| resolve_region(config.region.as_deref()));
        config.region = Some(region.clone());
        self.save(environment, &config)?;

        tracing::info!(environment, region = %region, "provisioning environment");

        // Bucket
        let bucket = match &config.bucket {
            Some(bucket) => bucket.clone(),
            None => {
                let suffix = Uuid::new_v4().simple().to_string();
                format!("skyrun-{}-{}", environment, &suffix[..12])
            }
        };
        self.objects
            .ensure_bucket(&bucket)
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::Bucket, e))?;
        config.bucket = Some(bucket.clone());
        self.save(environment, &config)?;
        tracing::info!(environment, bucket = %bucket, "bucket ready");

        // Task role
        let role_arn = self
            .compute
            .ensure_task_role(&task_role_name(environment))
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::TaskRole, e))?;
        config.task_role_arn = Some(role_arn.clone());
        self.save(environment, &config)?;
        tracing::info!(environment, role_arn = %role_arn, "task role ready");

        // Repository
        let repository_uri = self
            .compute
            .ensure_repository(&repository_name(environment))
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::Repository, e))?;
        config.repository_uri = Some(repository_uri.clone());
        self.save(environment, &config)?;
        tracing::info!(environment, repository = %repository_uri, "repository ready");

        // Executor image
        self.images
            .build_and_push(&repository_uri, &region, &opts.build_commands)
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::Image, e))?;
        tracing::info!(environment, "executor image pushed");

        // Cluster and network
        let cluster = self
            .compute
            .ensure_cluster(&cluster_name(environment))
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::Cluster, e))?;
        let (vpc_id, subnet_id) = match (&opts.vpc_id, &opts.subnet_id) {
            (Some(vpc), Some(subnet)) => {
                self.compute
                    .validate_network(vpc, subnet)
                    .await
                    .map_err(|e| step_failed(environment, ProvisionStep::Cluster, e))?;
                (vpc.clone(), subnet.clone())
            }
            _ => match (&config.vpc_id, &config.subnet_id) {
                (Some(vpc), Some(subnet)) => (vpc.clone(), subnet.clone()),
                _ => self
                    .compute
                    .default_network()
                    .await
                    .map_err(|e| step_failed(environment, ProvisionStep::Cluster, e))?,
            },
        };
        config.cluster = Some(cluster.clone());
        config.vpc_id = Some(vpc_id);
        config.subnet_id = Some(subnet_id.clone());
        self.save(environment, &config)?;
        tracing::info!(environment, cluster = %cluster, subnet = %subnet_id, "cluster ready");

        // Task definition
        let family = task_family(environment);
        let log_group = log_group_name(environment);
        let definition = TaskDefinitionSpec {
            family: family.clone(),
            image: format!("{repository_uri}:latest"),
            role_arn: role_arn.clone(),
            log_group: log_group.clone(),
            region: region.clone(),
            cpu_units: BASELINE_CPU_UNITS,
            memory_mb: BASELINE_MEMORY_MB,
        };
        let task_definition_arn = self
            .compute
            .register_task_definition(&definition)
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::TaskDefinition, e))?;
        config.task_family = Some(family);
        config.task_definition_arn = Some(task_definition_arn.clone());
        self.save(environment, &config)?;
        tracing::info!(environment, task_definition = %task_definition_arn, "task definition registered");

        // Log group
        self.logs
            .ensure_group(&log_group)
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::LogGroup, e))?;
        config.log_group = Some(log_group);
        self.save(environment, &config)?;

        // Scheduler function
        let env_vars = vec![
            ("SKYRUN_CLUSTER".to_string(), cluster),
            ("SKYRUN_TASK_DEFINITION".to_string(), task_definition_arn),
            ("SKYRUN_SUBNET_ID".to_string(), subnet_id),
        ];
        let function_arn = self
            .triggers
            .ensure_invoker(&invoker_name(environment), &role_arn, &env_vars)
            .await
            .map_err(|e| step_failed(environment, ProvisionStep::SchedulerFunction, e))?;
        config.scheduler_function_arn = Some(function_arn);
        config.initialized = true;
        self.save(environment, &config)?;

        tracing::info!(environment, "environment provisioned");
        Ok(config)
    }

    /// Delete everything `provision` created, in reverse order.
    ///
    /// Absent resources are treated as already deleted; the stored
    /// environment record is cleared last.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the environment was never saved.
    pub async fn teardown(&self, environment: &str) -> Result<()> {
        let config = self
            .store
            .load_environment(environment)?
            .ok_or_else(|| Error::NotFound(format!("environment '{environment}'")))?;

        tracing::info!(environment, "tearing down environment");

        // Scheduled jobs first, while the trigger namespace is known.
        let prefix = format!("skyrun-{environment}-");
        for rule in self.triggers.list_triggers(&prefix).await? {
            ignore_not_found(self.triggers.delete_trigger(&rule.name).await)?;
            tracing::info!(environment, trigger = %rule.name, "trigger deleted");
        }

        ignore_not_found(self.triggers.delete_invoker(&invoker_name(environment)).await)?;
        ignore_not_found(self.logs.delete_group(&log_group_name(environment)).await)?;

        let family = config.task_family.unwrap_or_else(|| task_family(environment));
        ignore_not_found(self.compute.deregister_task_family(&family).await)?;

        let cluster = config.cluster.unwrap_or_else(|| cluster_name(environment));
        ignore_not_found(self.compute.delete_cluster(&cluster).await)?;
        ignore_not_found(self.compute.delete_repository(&repository_name(environment)).await)?;
        ignore_not_found(self.compute.delete_task_role(&task_role_name(environment)).await)?;

        if let Some(bucket) = &config.bucket {
            ignore_not_found(self.objects.purge_bucket(bucket).await)?;
            ignore_not_found(self.objects.delete_bucket(bucket).await)?;
        }

        self.store.clear_environment(environment)?;
        tracing::info!(environment, "environment removed");
        Ok(())
    }

    fn save(&self, environment: &str, config: &EnvironmentConfig) -> Result<()> {
        self.store.save_environment(environment, config)?;
        Ok(())
    }
}

fn step_failed(environment: &str, step: ProvisionStep, source: Error) -> Error {
    Error::Provisioning {
        environment: environment.to_string(),
        step,
        source: anyhow::Error::new(source),
    }
}

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}
