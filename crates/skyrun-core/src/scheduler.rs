//! Recurring job schedules.
//!
//! A schedule is a provider trigger rule named `skyrun-{env}-{name}`
//! whose payload is the versioned [`TriggerPayload`] contract. The
//! deployed scheduler function launches the task from that payload
//! alone, so `create` ships the code bundle up front.

use std::sync::Arc;

use skyrun_store::ConfigStore;
use skyrun_types::{
    Error, JobRequest, Result, ScheduleExpression, ScheduledJob, TriggerPayload,
    TRIGGER_PAYLOAD_VERSION,
};

use crate::packager::CodePackager;
use crate::provider::TriggerProvider;

/// Manages trigger rules in the environment's namespace.
pub struct Scheduler {
    store: Arc<dyn ConfigStore>,
    triggers: Arc<dyn TriggerProvider>,
    packager: CodePackager,
}

/// Rule-name namespace for one environment. Rules outside it are never
/// touched or listed.
pub fn trigger_prefix(environment: &str) -> String {
    format!("skyrun-{environment}-")
}

pub fn trigger_name(environment: &str, name: &str) -> String {
    format!("skyrun-{environment}-{name}")
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        triggers: Arc<dyn TriggerProvider>,
        packager: CodePackager,
    ) -> Self {
        Self { store, triggers, packager }
    }

    /// Create a named schedule from a raw expression and a job request.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed expression or resource
    /// pair (before any provider call); [`Error::AlreadyExists`] for a
    /// name collision — delete the old schedule first.
    pub async fn create(
        &self,
        name: &str,
        expression: &str,
        request: &JobRequest,
    ) -> Result<ScheduledJob> {
        let schedule = ScheduleExpression::parse(expression)?;
        request.resources.validate()?;

        let environment = &request.environment;
        let config = self
            .store
            .load_environment(environment)?
            .ok_or_else(|| Error::Configuration {
                environment: environment.to_string(),
                message: "not initialized; run setup first".into(),
            })?;
        config.require_initialized(environment)?;
        let bucket = config.require(environment, "bucket", &config.bucket)?;
        let function_arn = config.require(
            environment,
            "scheduler_function_arn",
            &config.scheduler_function_arn,
        )?;

        let rule = trigger_name(environment, name);
        if self.triggers.trigger_exists(&rule).await? {
            return Err(Error::AlreadyExists(format!("schedule '{name}'")));
        }

        let key_prefix = format!("scheduled/{environment}/{name}");
        let artifact = self
            .packager
            .package_and_upload(&request.script, bucket, &key_prefix, &request.excludes)
            .await?;

        let script = request
            .script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Validation(format!("script path '{}' has no name", request.script.display()))
            })?;
        let payload = TriggerPayload {
            version: TRIGGER_PAYLOAD_VERSION,
            name: name.to_string(),
            environment: environment.clone(),
            bucket: artifact.bucket.clone(),
            key: artifact.key.clone(),
            script,
            method: request.method.clone(),
            params: request.params.clone(),
            vcpus: request.resources.vcpus,
            memory_mb: request.resources.memory_mb,
            use_spot: request.use_spot,
        };
        let payload_json = serde_json::to_string(&payload)?;

        let trigger_arn = self
            .triggers
            .put_trigger(&rule, &schedule, &payload_json, function_arn)
            .await?;
        tracing::info!(
            environment,
            schedule = name,
            rule = %rule,
            expression = %schedule,
            "schedule created"
        );

        Ok(ScheduledJob {
            name: name.to_string(),
            script: request.script.clone(),
            schedule,
            resources: request.resources,
            use_spot: request.use_spot,
            method: request.method.clone(),
            params: request.params.clone(),
            environment: environment.clone(),
            key: artifact.key,
            trigger_arn,
        })
    }

    /// Schedules in this environment's namespace. Rules whose payload
    /// is not the skyrun contract are skipped silently.
    pub async fn list(&self, environment: &str) -> Result<Vec<ScheduledJob>> {
        let rules = self.triggers.list_triggers(&trigger_prefix(environment)).await?;
        let mut jobs = Vec::new();
        for rule in rules {
            let Some(raw) = rule.payload.as_deref() else { continue };
            let Ok(payload) = serde_json::from_str::<TriggerPayload>(raw) else {
                tracing::debug!(rule = %rule.name, "skipping foreign trigger");
                continue;
            };
            let Ok(schedule) = ScheduleExpression::parse(&rule.schedule) else {
                tracing::debug!(rule = %rule.name, "skipping trigger with foreign schedule");
                continue;
            };
            jobs.push(ScheduledJob {
                name: payload.name,
                script: payload.script.into(),
                schedule,
                resources: skyrun_types::ResourceSpec {
                    vcpus: payload.vcpus,
                    memory_mb: payload.memory_mb,
                },
                use_spot: payload.use_spot,
                method: payload.method,
                params: payload.params,
                environment: payload.environment,
                key: payload.key,
                trigger_arn: rule.arn,
            });
        }
        Ok(jobs)
    }

    /// Delete a named schedule.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no such schedule exists.
    pub async fn delete(&self, environment: &str, name: &str) -> Result<()> {
        let rule = trigger_name(environment, name);
        if !self.triggers.trigger_exists(&rule).await? {
            return Err(Error::NotFound(format!("schedule '{name}'")));
        }
        self.triggers.delete_trigger(&rule).await?;
        tracing::info!(environment, schedule = name, "schedule deleted");
        Ok(())
    }
}
