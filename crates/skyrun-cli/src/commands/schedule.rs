use std::path::Path;

use anyhow::Result;
use skyrun_core::Scheduler;

use crate::context::AppContext;
use crate::JobArgs;

fn scheduler(ctx: &AppContext) -> Scheduler {
    Scheduler::new(ctx.store.clone(), ctx.providers.triggers.clone(), ctx.packager())
}

pub async fn create(
    name: &str,
    script: &Path,
    cron: Option<String>,
    rate: Option<String>,
    environment: &str,
    args: &JobArgs,
) -> Result<()> {
    // clap enforces exactly one of the two.
    let expression = match (cron, rate) {
        (Some(fields), None) => format!("cron({fields})"),
        (None, Some(interval)) => format!("rate({interval})"),
        _ => anyhow::bail!("pass exactly one of --cron or --rate"),
    };

    let ctx = AppContext::load(environment).await?;
    let request = super::job_request(script, environment, args)?;
    let job = scheduler(&ctx).create(name, &expression, &request).await?;

    println!("Schedule '{name}' created: {} runs on {}", script.display(), job.schedule);
    Ok(())
}

pub async fn list(environment: &str) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    let jobs = scheduler(&ctx).list(environment).await?;

    if jobs.is_empty() {
        println!("No schedules in environment '{environment}'.");
        return Ok(());
    }
    println!("Schedules in environment '{environment}':");
    for job in jobs {
        let mut details = format!("{}", job.schedule);
        if let Some(method) = &job.method {
            details.push_str(&format!(", method {method}"));
        }
        if job.use_spot {
            details.push_str(", spot");
        }
        println!("  {:<24} {} ({details})", job.name, job.script.display());
    }
    Ok(())
}

pub async fn delete(name: &str, environment: &str) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    scheduler(&ctx).delete(environment, name).await?;
    println!("Schedule '{name}' deleted.");
    Ok(())
}
