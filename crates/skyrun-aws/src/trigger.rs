//! EventBridge-backed [`TriggerProvider`], with a Lambda invoker
//! function that launches the task from the trigger payload.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use async_trait::async_trait;
use aws_sdk_eventbridge::types::{RuleState, Target};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime};
use skyrun_core::provider::{TriggerProvider, TriggerRule};
use skyrun_types::{Error, Result, ScheduleExpression};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{is_already_exists, is_missing, map_sdk_err};

const TARGET_ID: &str = "skyrun";
const INVOKE_STATEMENT_ID: &str = "skyrun-events-invoke";

/// The invoker function body. It reads the trigger payload and submits
/// one task, mirroring what a direct dispatch does.
const HANDLER_SOURCE: &str = r#"import json
import os

import boto3


def main(event, context):
    ecs = boto3.client("ecs")
    command = [event["bucket"], event["key"], event["script"]]
    if event.get("method"):
        command.append(event["method"])
        if event.get("params") is not None:
            command.append(json.dumps(event["params"]))

    capacity = {}
    if event.get("use_spot"):
        capacity = {"capacityProviderStrategy": [{"capacityProvider": "FARGATE_SPOT", "weight": 1}]}
    else:
        capacity = {"launchType": "FARGATE"}

    response = ecs.run_task(
        cluster=os.environ["SKYRUN_CLUSTER"],
        taskDefinition=os.environ["SKYRUN_TASK_DEFINITION"],
        count=1,
        networkConfiguration={
            "awsvpcConfiguration": {
                "subnets": [os.environ["SKYRUN_SUBNET_ID"]],
                "assignPublicIp": "ENABLED",
            }
        },
        overrides={
            "cpu": str(int(event["vcpus"] * 1024)),
            "memory": str(event["memory_mb"]),
            "containerOverrides": [
                {
                    "name": "skyrun-executor",
                    "command": command,
                    "cpu": int(event["vcpus"] * 1024),
                    "memory": event["memory_mb"],
                }
            ],
        },
        **capacity,
    )
    failures = response.get("failures") or []
    if failures:
        raise RuntimeError(f"task submission failed: {failures[0]}")
    return {"taskArn": response["tasks"][0]["taskArn"]}
"#;

pub struct EventBridgeTriggerProvider {
    events: aws_sdk_eventbridge::Client,
    lambda: aws_sdk_lambda::Client,
}

impl EventBridgeTriggerProvider {
    pub fn new(events: aws_sdk_eventbridge::Client, lambda: aws_sdk_lambda::Client) -> Self {
        Self { events, lambda }
    }

    async fn function_arn(&self, name: &str) -> Result<String> {
        let response = self
            .lambda
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "reading function"))?;
        response
            .function_arn()
            .map(str::to_string)
            .ok_or_else(|| Error::provider("function has no arn"))
    }
}

/// Bundle the handler source as a single-file zip, as the function
/// deployment API expects.
fn handler_bundle() -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    writer
        .start_file("handler.py", options)
        .map_err(|e| Error::Package(e.to_string()))?;
    writer.write_all(HANDLER_SOURCE.as_bytes())?;
    Ok(writer
        .finish()
        .map_err(|e| Error::Package(e.to_string()))?
        .into_inner())
}

#[async_trait]
impl TriggerProvider for EventBridgeTriggerProvider {
    async fn ensure_invoker(
        &self,
        name: &str,
        role_arn: &str,
        env_vars: &[(String, String)],
    ) -> Result<String> {
        let bundle = handler_bundle()?;
        let variables: HashMap<String, String> = env_vars.iter().cloned().collect();
        let environment = Environment::builder().set_variables(Some(variables)).build();

        let create = self
            .lambda
            .create_function()
            .function_name(name)
            .runtime(Runtime::Python312)
            .handler("handler.main")
            .role(role_arn)
            .timeout(60)
            .environment(environment.clone())
            .code(FunctionCode::builder().zip_file(Blob::new(bundle.clone())).build())
            .send()
            .await;
        let arn = match create {
            Ok(response) => response
                .function_arn()
                .map(str::to_string)
                .ok_or_else(|| Error::provider("function created without an arn"))?,
            Err(err) if is_already_exists(&err) => {
                self.lambda
                    .update_function_code()
                    .function_name(name)
                    .zip_file(Blob::new(bundle))
                    .send()
                    .await
                    .map_err(|err| map_sdk_err(err, "updating function code"))?;
                self.lambda
                    .update_function_configuration()
                    .function_name(name)
                    .environment(environment)
                    .send()
                    .await
                    .map_err(|err| map_sdk_err(err, "updating function configuration"))?;
                self.function_arn(name).await?
            }
            Err(err) => return Err(map_sdk_err(err, "creating function")),
        };

        // Allow the event bus to invoke the function.
        match self
            .lambda
            .add_permission()
            .function_name(name)
            .statement_id(INVOKE_STATEMENT_ID)
            .action("lambda:InvokeFunction")
            .principal("events.amazonaws.com")
            .send()
            .await
        {
            Ok(_) => {}
            Err(err) if is_already_exists(&err) => {}
            Err(err) => return Err(map_sdk_err(err, "adding invoke permission")),
        }
        Ok(arn)
    }

    async fn delete_invoker(&self, name: &str) -> Result<()> {
        self.lambda
            .delete_function()
            .function_name(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting function"))?;
        Ok(())
    }

    async fn put_trigger(
        &self,
        name: &str,
        schedule: &ScheduleExpression,
        payload: &str,
        target_arn: &str,
    ) -> Result<String> {
        let response = self
            .events
            .put_rule()
            .name(name)
            .schedule_expression(schedule.to_string())
            .state(RuleState::Enabled)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "creating rule"))?;
        let rule_arn = response
            .rule_arn()
            .map(str::to_string)
            .ok_or_else(|| Error::provider("rule created without an arn"))?;

        let target = Target::builder()
            .id(TARGET_ID)
            .arn(target_arn)
            .input(payload)
            .build()
            .map_err(|e| Error::provider(format!("building rule target: {e}")))?;
        self.events
            .put_targets()
            .rule(name)
            .targets(target)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "attaching rule target"))?;
        Ok(rule_arn)
    }

    async fn trigger_exists(&self, name: &str) -> Result<bool> {
        match self.events.describe_rule().name(name).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_missing(&err) => Ok(false),
            Err(err) => Err(map_sdk_err(err, "describing rule")),
        }
    }

    async fn list_triggers(&self, prefix: &str) -> Result<Vec<TriggerRule>> {
        let mut rules = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .events
                .list_rules()
                .name_prefix(prefix)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "listing rules"))?;
            for rule in page.rules() {
                let Some(name) = rule.name() else { continue };
                let targets = self
                    .events
                    .list_targets_by_rule()
                    .rule(name)
                    .send()
                    .await
                    .map_err(|err| map_sdk_err(err, "listing rule targets"))?;
                let payload = targets
                    .targets()
                    .first()
                    .and_then(|t| t.input())
                    .map(str::to_string);
                rules.push(TriggerRule {
                    name: name.to_string(),
                    arn: rule.arn().unwrap_or_default().to_string(),
                    schedule: rule.schedule_expression().unwrap_or_default().to_string(),
                    payload,
                });
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(rules),
            }
        }
    }

    async fn delete_trigger(&self, name: &str) -> Result<()> {
        match self
            .events
            .remove_targets()
            .rule(name)
            .ids(TARGET_ID)
            .send()
            .await
        {
            Ok(_) => {}
            Err(err) if is_missing(&err) => {
                return Err(Error::NotFound(format!("rule '{name}'")));
            }
            Err(err) => return Err(map_sdk_err(err, "removing rule targets")),
        }
        self.events
            .delete_rule()
            .name(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting rule"))?;
        Ok(())
    }
}
