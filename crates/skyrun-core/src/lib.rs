//! Orchestration core for skyrun.
//!
//! Provider ports (trait seams over object storage, container compute,
//! scheduled triggers, and log storage) plus the five subsystems built
//! on them: packaging, provisioning, dispatch, scheduling, and log
//! tailing. Cloud-specific adapters live in `skyrun-aws`.

pub mod dispatch;
pub mod infra;
pub mod logs;
pub mod packager;
pub mod provider;
pub mod retry;
pub mod scheduler;

pub use dispatch::JobDispatcher;
pub use infra::{InfrastructureManager, ProvisionOptions};
pub use logs::{FetchOptions, LogTailer, TailOptions};
pub use packager::CodePackager;
pub use scheduler::Scheduler;
