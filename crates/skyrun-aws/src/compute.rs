//! ECS/Fargate-backed [`ComputeProvider`], with ECR for the image
//! repository, IAM for the task role, and EC2 for network discovery.

use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, CapacityProviderStrategyItem, Compatibility,
    ContainerDefinition, ContainerOverride, DesiredStatus, KeyValuePair, LaunchType,
    LogConfiguration, LogDriver, NetworkConfiguration, NetworkMode, TaskOverride,
};
use skyrun_core::provider::{Capacity, ComputeProvider, LaunchSpec, TaskDefinitionSpec};
use skyrun_types::{Error, Result, TaskRun, TaskStatus};

use crate::error::{is_already_exists, is_missing, map_sdk_err};

/// Container name inside every task definition; run overrides target it.
pub const CONTAINER_NAME: &str = "skyrun-executor";

/// `DescribeTasks` accepts at most 100 task ARNs per call.
const DESCRIBE_TASKS_BATCH: usize = 100;

/// Trust policy for the shared task/invoker role.
const TRUST_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Principal": {"Service": ["ecs-tasks.amazonaws.com", "lambda.amazonaws.com"]},
      "Action": "sts:AssumeRole"
    }
  ]
}"#;

/// Managed policies attached to the role: task execution, bundle
/// access, and log delivery.
const ROLE_POLICY_ARNS: &[&str] = &[
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy",
    "arn:aws:iam::aws:policy/AmazonS3FullAccess",
    "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess",
    "arn:aws:iam::aws:policy/AmazonECS_FullAccess",
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
];

pub struct EcsComputeProvider {
    ecs: aws_sdk_ecs::Client,
    ecr: aws_sdk_ecr::Client,
    iam: aws_sdk_iam::Client,
    ec2: aws_sdk_ec2::Client,
}

impl EcsComputeProvider {
    pub fn new(
        ecs: aws_sdk_ecs::Client,
        ecr: aws_sdk_ecr::Client,
        iam: aws_sdk_iam::Client,
        ec2: aws_sdk_ec2::Client,
    ) -> Self {
        Self { ecs, ecr, iam, ec2 }
    }

    async fn task_arns(&self, cluster: &str, status: DesiredStatus) -> Result<Vec<String>> {
        let response = self
            .ecs
            .list_tasks()
            .cluster(cluster)
            .desired_status(status)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "listing tasks"))?;
        Ok(response.task_arns().to_vec())
    }
}

#[async_trait]
impl ComputeProvider for EcsComputeProvider {
    async fn ensure_cluster(&self, name: &str) -> Result<String> {
        // create_cluster is idempotent; it returns the existing cluster.
        self.ecs
            .create_cluster()
            .cluster_name(name)
            .capacity_providers("FARGATE")
            .capacity_providers("FARGATE_SPOT")
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "creating cluster"))?;
        Ok(name.to_string())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.ecs
            .delete_cluster()
            .cluster(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting cluster"))?;
        Ok(())
    }

    async fn ensure_repository(&self, name: &str) -> Result<String> {
        match self.ecr.create_repository().repository_name(name).send().await {
            Ok(response) => response
                .repository()
                .and_then(|repo| repo.repository_uri())
                .map(str::to_string)
                .ok_or_else(|| Error::provider("repository created without a uri")),
            Err(err) if is_already_exists(&err) => {
                let response = self
                    .ecr
                    .describe_repositories()
                    .repository_names(name)
                    .send()
                    .await
                    .map_err(|err| map_sdk_err(err, "describing repository"))?;
                response
                    .repositories()
                    .first()
                    .and_then(|repo| repo.repository_uri())
                    .map(str::to_string)
                    .ok_or_else(|| Error::provider("repository exists without a uri"))
            }
            Err(err) => Err(map_sdk_err(err, "creating repository")),
        }
    }

    async fn delete_repository(&self, name: &str) -> Result<()> {
        self.ecr
            .delete_repository()
            .repository_name(name)
            .force(true)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting repository"))?;
        Ok(())
    }

    async fn ensure_task_role(&self, name: &str) -> Result<String> {
        match self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(TRUST_POLICY)
            .send()
            .await
        {
            Ok(_) => {}
            Err(err) if is_already_exists(&err) => {}
            Err(err) => return Err(map_sdk_err(err, "creating role")),
        }
        for policy_arn in ROLE_POLICY_ARNS {
            self.iam
                .attach_role_policy()
                .role_name(name)
                .policy_arn(*policy_arn)
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "attaching role policy"))?;
        }
        let response = self
            .iam
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "reading role"))?;
        response
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| Error::provider("role has no arn"))
    }

    async fn delete_task_role(&self, name: &str) -> Result<()> {
        let attached = match self.iam.list_attached_role_policies().role_name(name).send().await {
            Ok(response) => response.attached_policies().to_vec(),
            Err(err) if is_missing(&err) => {
                return Err(Error::NotFound(format!("role '{name}'")));
            }
            Err(err) => return Err(map_sdk_err(err, "listing role policies")),
        };
        for policy in attached {
            if let Some(policy_arn) = policy.policy_arn() {
                self.iam
                    .detach_role_policy()
                    .role_name(name)
                    .policy_arn(policy_arn)
                    .send()
                    .await
                    .map_err(|err| map_sdk_err(err, "detaching role policy"))?;
            }
        }
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting role"))?;
        Ok(())
    }

    async fn default_network(&self) -> Result<(String, String)> {
        let vpcs = self
            .ec2
            .describe_vpcs()
            .filters(Filter::builder().name("is-default").values("true").build())
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "describing vpcs"))?;
        let vpc_id = vpcs
            .vpcs()
            .first()
            .and_then(|vpc| vpc.vpc_id())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("account has no default vpc; pass one explicitly"))?;

        let subnets = self
            .ec2
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(&vpc_id).build())
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "describing subnets"))?;
        let subnet_id = subnets
            .subnets()
            .first()
            .and_then(|subnet| subnet.subnet_id())
            .map(str::to_string)
            .ok_or_else(|| Error::provider(format!("vpc '{vpc_id}' has no subnets")))?;
        Ok((vpc_id, subnet_id))
    }

    async fn validate_network(&self, vpc_id: &str, subnet_id: &str) -> Result<()> {
        let response = self
            .ec2
            .describe_subnets()
            .subnet_ids(subnet_id)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "describing subnet"))?;
        let actual_vpc = response.subnets().first().and_then(|subnet| subnet.vpc_id());
        if actual_vpc == Some(vpc_id) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "subnet '{subnet_id}' does not belong to vpc '{vpc_id}'"
            )))
        }
    }

    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> Result<String> {
        let log_configuration = LogConfiguration::builder()
            .log_driver(LogDriver::Awslogs)
            .options("awslogs-group", &spec.log_group)
            .options("awslogs-region", &spec.region)
            .options("awslogs-stream-prefix", "skyrun")
            .options("awslogs-create-group", "true")
            .build()
            .map_err(|e| Error::provider(format!("building log configuration: {e}")))?;
        let container = ContainerDefinition::builder()
            .name(CONTAINER_NAME)
            .image(&spec.image)
            .essential(true)
            .log_configuration(log_configuration)
            .build();

        let response = self
            .ecs
            .register_task_definition()
            .family(&spec.family)
            .requires_compatibilities(Compatibility::Fargate)
            .network_mode(NetworkMode::Awsvpc)
            .cpu(spec.cpu_units.to_string())
            .memory(spec.memory_mb.to_string())
            .execution_role_arn(&spec.role_arn)
            .task_role_arn(&spec.role_arn)
            .container_definitions(container)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "registering task definition"))?;
        response
            .task_definition()
            .and_then(|td| td.task_definition_arn())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("task definition registered without an arn"))
    }

    async fn deregister_task_family(&self, family: &str) -> Result<()> {
        let response = self
            .ecs
            .list_task_definitions()
            .family_prefix(family)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "listing task definitions"))?;
        let arns = response.task_definition_arns();
        if arns.is_empty() {
            return Err(Error::NotFound(format!("task family '{family}'")));
        }
        for arn in arns {
            self.ecs
                .deregister_task_definition()
                .task_definition(arn)
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "deregistering task definition"))?;
        }
        Ok(())
    }

    async fn run_task(&self, spec: &LaunchSpec) -> Result<String> {
        let vpc_configuration = AwsVpcConfiguration::builder()
            .subnets(&spec.subnet_id)
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .map_err(|e| Error::provider(format!("building network configuration: {e}")))?;
        let network = NetworkConfiguration::builder()
            .awsvpc_configuration(vpc_configuration)
            .build();

        let mut container_override = ContainerOverride::builder()
            .name(CONTAINER_NAME)
            .set_command(Some(spec.command.clone()))
            .cpu(spec.cpu_units as i32)
            .memory(spec.memory_mb as i32);
        if let Some(log_group) = &spec.log_group {
            container_override = container_override.environment(
                KeyValuePair::builder().name("SKYRUN_LOG_GROUP").value(log_group).build(),
            );
        }
        let overrides = TaskOverride::builder()
            .container_overrides(container_override.build())
            .cpu(spec.cpu_units.to_string())
            .memory(spec.memory_mb.to_string())
            .build();

        let mut request = self
            .ecs
            .run_task()
            .cluster(&spec.cluster)
            .task_definition(&spec.task_definition_arn)
            .network_configuration(network)
            .overrides(overrides)
            .count(1);
        request = match spec.capacity {
            Capacity::Spot => request.capacity_provider_strategy(
                CapacityProviderStrategyItem::builder()
                    .capacity_provider("FARGATE_SPOT")
                    .weight(1)
                    .build()
                    .map_err(|e| Error::provider(format!("building capacity strategy: {e}")))?,
            ),
            Capacity::OnDemand => request.launch_type(LaunchType::Fargate),
        };

        let response = request.send().await.map_err(|err| map_sdk_err(err, "running task"))?;
        if let Some(failure) = response.failures().first() {
            return Err(Error::provider(format!(
                "task submission failed: {} ({})",
                failure.reason().unwrap_or("unknown reason"),
                failure.detail().unwrap_or("no detail"),
            )));
        }
        let task_arn = response
            .tasks()
            .first()
            .and_then(|task| task.task_arn())
            .ok_or_else(|| Error::provider("provider returned no task"))?;
        Ok(task_arn.rsplit('/').next().unwrap_or(task_arn).to_string())
    }

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<TaskRun>> {
        let mut arns = self.task_arns(cluster, DesiredStatus::Running).await?;
        arns.extend(self.task_arns(cluster, DesiredStatus::Stopped).await?);
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::with_capacity(arns.len());
        for chunk in arns.chunks(DESCRIBE_TASKS_BATCH) {
            let response = self
                .ecs
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "describing tasks"))?;
            runs.extend(response.tasks().iter().map(|task| {
                let id = task
                    .task_arn()
                    .map(|arn| arn.rsplit('/').next().unwrap_or(arn).to_string())
                    .unwrap_or_default();
                let script = task
                    .overrides()
                    .and_then(|o| o.container_overrides().first())
                    .and_then(|c| c.command().get(2))
                    .cloned();
                TaskRun {
                    id,
                    status: TaskStatus::from_provider(task.last_status().unwrap_or("UNKNOWN")),
                    script,
                    created_at_ms: task.created_at().and_then(|t| t.to_millis().ok()),
                }
            }));
        }
        Ok(runs)
    }

    async fn stop_task(&self, cluster: &str, task_id: &str) -> Result<()> {
        self.ecs
            .stop_task()
            .cluster(cluster)
            .task(task_id)
            .reason("stopped via skyrun")
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "stopping task"))?;
        Ok(())
    }
}
