//! Shared skyrun domain types and error model.
//!
//! No I/O here; this crate is safe to depend on from every other crate
//! in the workspace.

pub mod environment;
pub mod error;
pub mod job;
pub mod log;
pub mod resources;
pub mod schedule;

pub use environment::{EnvironmentConfig, DEFAULT_ENVIRONMENT, DEFAULT_REGION};
pub use error::{compute_backoff, Error, ProvisionStep, Result};
pub use job::{
    JobRequest, PackagedArtifact, ScheduledJob, TaskRun, TaskStatus, TriggerPayload,
    TRIGGER_PAYLOAD_VERSION,
};
pub use log::LogEvent;
pub use resources::ResourceSpec;
pub use schedule::{RateUnit, ScheduleExpression};
