use anyhow::Result;
use skyrun_core::InfrastructureManager;

use crate::context::AppContext;

pub async fn execute(environment: &str) -> Result<()> {
    let ctx = AppContext::load(environment).await?;

    println!("Tearing down environment '{environment}' in {}...", ctx.region);

    let manager = InfrastructureManager::new(
        ctx.store.clone(),
        ctx.providers.objects.clone(),
        ctx.providers.compute.clone(),
        ctx.providers.triggers.clone(),
        ctx.providers.logs.clone(),
        ctx.providers.images.clone(),
    );
    manager.teardown(environment).await?;

    println!("Environment '{environment}' removed.");
    Ok(())
}
