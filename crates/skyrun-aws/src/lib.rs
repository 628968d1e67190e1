//! AWS adapters for the skyrun provider ports.
//!
//! One module per service family: S3 for bundles, ECS/ECR/IAM/EC2 for
//! compute, EventBridge + Lambda for schedules, CloudWatch Logs for
//! logs, and a Docker CLI image builder.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use skyrun_core::provider::{
    ComputeProvider, ImageBuilder, LogStore, ObjectStore, TriggerProvider,
};

pub mod compute;
pub mod docker;
mod error;
pub mod logs;
pub mod s3;
pub mod trigger;

pub use compute::EcsComputeProvider;
pub use docker::DockerImageBuilder;
pub use logs::CloudWatchLogStore;
pub use s3::S3ObjectStore;
pub use trigger::EventBridgeTriggerProvider;

/// The full adapter set for one region, ready to hand to the
/// orchestrators.
pub struct AwsProviders {
    pub objects: Arc<dyn ObjectStore>,
    pub compute: Arc<dyn ComputeProvider>,
    pub triggers: Arc<dyn TriggerProvider>,
    pub logs: Arc<dyn LogStore>,
    pub images: Arc<dyn ImageBuilder>,
}

/// Load shared credentials and construct every adapter for `region`.
pub async fn load_providers(region: &str) -> AwsProviders {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;

    let ecr = aws_sdk_ecr::Client::new(&config);
    AwsProviders {
        objects: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&config), region)),
        compute: Arc::new(EcsComputeProvider::new(
            aws_sdk_ecs::Client::new(&config),
            ecr.clone(),
            aws_sdk_iam::Client::new(&config),
            aws_sdk_ec2::Client::new(&config),
        )),
        triggers: Arc::new(EventBridgeTriggerProvider::new(
            aws_sdk_eventbridge::Client::new(&config),
            aws_sdk_lambda::Client::new(&config),
        )),
        logs: Arc::new(CloudWatchLogStore::new(aws_sdk_cloudwatchlogs::Client::new(&config))),
        images: Arc::new(DockerImageBuilder::new(ecr)),
    }
}
