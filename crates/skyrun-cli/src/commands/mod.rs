pub mod logs;
pub mod run;
pub mod schedule;
pub mod setup;
pub mod tasks;
pub mod teardown;

use std::path::Path;

use anyhow::Result;
use skyrun_types::{JobRequest, ResourceSpec};

use crate::JobArgs;

/// Build a core job request from the shared CLI flags.
pub(crate) fn job_request(script: &Path, environment: &str, args: &JobArgs) -> Result<JobRequest> {
    let mut request = JobRequest::new(script, environment);
    request.resources = ResourceSpec { vcpus: args.vcpus, memory_mb: args.memory };
    request.use_spot = args.spot;
    request.method = args.method.clone();
    request.params = args
        .params
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {e}"))?;
    request.excludes = args.excludes.clone();
    Ok(request)
}
