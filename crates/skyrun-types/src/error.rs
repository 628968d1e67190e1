//! Error taxonomy and retry backoff policy helpers.

use std::time::Duration;

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Provisioning step identifiers, in execution order.
///
/// Carried inside [`Error::Provisioning`] so a failed `setup` names the
/// exact step to resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    Bucket,
    TaskRole,
    Repository,
    Image,
    Cluster,
    TaskDefinition,
    LogGroup,
    SchedulerFunction,
}

impl ProvisionStep {
    /// Human-readable step name used in error and log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::TaskRole => "task-role",
            Self::Repository => "repository",
            Self::Image => "image",
            Self::Cluster => "cluster",
            Self::TaskDefinition => "task-definition",
            Self::LogGroup => "log-group",
            Self::SchedulerFunction => "scheduler-function",
        }
    }
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error — categorised errors for retry decisions
// ---------------------------------------------------------------------------

/// Top-level error for every skyrun operation.
///
/// `Provider` wraps opaque adapter failures with a `transient` flag;
/// only transient provider errors are ever retried, and only inside the
/// two bounded loops (artifact upload, log poll). Everything else fails
/// fast and surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Environment is missing or lacks a required field.
    #[error("environment '{environment}' is not usable: {message}")]
    Configuration { environment: String, message: String },

    /// Request rejected before any network call.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A provisioning step failed; earlier steps are kept.
    #[error("provisioning step '{step}' failed for environment '{environment}'")]
    Provisioning {
        environment: String,
        step: ProvisionStep,
        #[source]
        source: anyhow::Error,
    },

    /// Task submission was rejected. Never retried automatically.
    #[error("job submission failed: {0}")]
    Dispatch(String),

    /// A resource with the same name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Opaque provider failure; `transient` marks throttle/timeout-class
    /// errors eligible for bounded retry.
    #[error("provider error: {message}")]
    Provider { message: String, transient: bool },

    /// Building the code archive failed.
    #[error("packaging failed: {0}")]
    Package(String),

    #[error("config store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a non-transient provider failure.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            transient: false,
        }
    }

    /// Shorthand for a transient (retryable) provider failure.
    pub fn provider_transient(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            transient: true,
        }
    }

    /// Returns `true` if this error is a transient provider failure that
    /// a bounded retry loop may attempt again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { transient: true, .. })
    }
}

/// Compute retry delay for a transient failure, by attempt number (1-based).
///
/// Exponential from a 1 s base, capped at 60 s.
#[must_use]
pub fn compute_backoff(attempt: u32) -> Duration {
    let delay_ms = BACKOFF_BASE_MS.saturating_mul(2u64.pow(attempt.saturating_sub(1).min(63)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
