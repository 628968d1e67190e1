use anyhow::Result;
use chrono::{Local, TimeZone};
use skyrun_core::JobDispatcher;

use crate::context::AppContext;

fn dispatcher(ctx: &AppContext) -> JobDispatcher {
    JobDispatcher::new(ctx.store.clone(), ctx.providers.compute.clone(), ctx.packager())
}

pub async fn list(environment: &str) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    let tasks = dispatcher(&ctx).list_tasks(environment).await?;

    if tasks.is_empty() {
        println!("No tasks in environment '{environment}'.");
        return Ok(());
    }
    println!("{:<34} {:<14} {:<20} STARTED", "TASK", "STATUS", "SCRIPT");
    for task in tasks {
        let script = task.script.as_deref().unwrap_or("-");
        let started = task
            .created_at_ms
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<34} {:<14} {:<20} {started}", task.id, task.status.to_string(), script);
    }
    Ok(())
}

pub async fn stop(id: &str, environment: &str) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    dispatcher(&ctx).stop_task(environment, id).await?;
    println!("Stopped {id}.");
    Ok(())
}
