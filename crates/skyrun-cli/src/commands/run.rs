use std::path::Path;

use anyhow::Result;
use skyrun_core::JobDispatcher;

use crate::context::AppContext;
use crate::JobArgs;

pub async fn execute(
    script: &Path,
    environment: &str,
    log_group: Option<String>,
    args: &JobArgs,
) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    let mut request = super::job_request(script, environment, args)?;
    request.log_group = log_group;

    let dispatcher =
        JobDispatcher::new(ctx.store.clone(), ctx.providers.compute.clone(), ctx.packager());
    let job_id = dispatcher.run(&request).await?;

    println!("Submitted {} as {job_id}", script.display());
    println!("Follow its logs with: skyrun logs --task {job_id} --follow --env {environment}");
    Ok(())
}
