use anyhow::Result;
use skyrun_core::{InfrastructureManager, ProvisionOptions};

use crate::context::AppContext;

pub async fn execute(
    environment: &str,
    region: Option<String>,
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    build_commands: Vec<String>,
) -> Result<()> {
    let ctx = match &region {
        // An explicit region must win over whatever is stored.
        Some(region) => AppContext::load_in_region(region).await?,
        None => AppContext::load(environment).await?,
    };

    println!("Setting up environment '{environment}' in {}...", ctx.region);

    let manager = InfrastructureManager::new(
        ctx.store.clone(),
        ctx.providers.objects.clone(),
        ctx.providers.compute.clone(),
        ctx.providers.triggers.clone(),
        ctx.providers.logs.clone(),
        ctx.providers.images.clone(),
    );
    let opts = ProvisionOptions {
        region: Some(ctx.region.clone()),
        vpc_id,
        subnet_id,
        build_commands,
    };
    let config = manager.provision(environment, &opts).await?;

    println!("Environment '{environment}' is ready.");
    if let Some(bucket) = &config.bucket {
        println!("  bucket:       {bucket}");
    }
    if let Some(cluster) = &config.cluster {
        println!("  cluster:      {cluster}");
    }
    if let Some(subnet) = &config.subnet_id {
        println!("  subnet:       {subnet}");
    }
    if let Some(group) = &config.log_group {
        println!("  log group:    {group}");
    }
    println!("Run a job with: skyrun run <script> --env {environment}");
    Ok(())
}
