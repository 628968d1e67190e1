use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone, Utc};
use skyrun_core::dispatch::JOB_ID_PREFIX;
use skyrun_core::infra::log_group_name;
use skyrun_core::{FetchOptions, LogTailer, TailOptions};
use skyrun_types::LogEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    environment: &str,
    group: Option<String>,
    task: Option<String>,
    since: &str,
    filter: Option<String>,
    follow: bool,
    show_stream_names: bool,
) -> Result<()> {
    let ctx = AppContext::load(environment).await?;
    let group = match group {
        Some(group) => group,
        None => ctx
            .store
            .load_environment(environment)?
            .and_then(|config| config.log_group)
            .unwrap_or_else(|| log_group_name(environment)),
    };
    // Accept job ids as well as bare task ids.
    let task_id = task.map(|id| id.strip_prefix(JOB_ID_PREFIX).unwrap_or(&id).to_string());

    let tailer = LogTailer::new(ctx.providers.logs.clone());

    if follow {
        let opts = TailOptions { group: group.clone(), filter, task_id };
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<LogEvent>(256);

        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });

        println!("Following {group} (ctrl-c to stop)...");
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event, show_stream_names);
            }
        });
        let result = tailer.tail(&opts, cancel, tx).await;
        let _ = printer.await;
        result?;
        return Ok(());
    }

    let start_ms = Utc::now().timestamp_millis() - parse_since(since)?;
    let opts = FetchOptions {
        group: group.clone(),
        start_ms: Some(start_ms),
        end_ms: None,
        filter,
        task_id,
    };
    let events = tailer.fetch(&opts).await?;
    if events.is_empty() {
        println!("No events in {group} for the last {since}.");
        return Ok(());
    }
    for event in &events {
        print_event(event, show_stream_names);
    }
    Ok(())
}

fn print_event(event: &LogEvent, show_stream_names: bool) {
    let timestamp = Local
        .timestamp_millis_opt(event.timestamp_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| event.timestamp_ms.to_string());
    if show_stream_names {
        println!("[{timestamp}] [{}] {}", event.stream, event.message);
    } else {
        println!("[{timestamp}] {}", event.message);
    }
}

/// Parse a lookback like `30s`, `15m`, `2h`, or `1d` into milliseconds.
fn parse_since(since: &str) -> Result<i64> {
    let since = since.trim();
    let split = since
        .char_indices()
        .last()
        .map(|(i, _)| i)
        .unwrap_or_default();
    let (value, unit) = since.split_at(split);
    let value: i64 = value
        .parse()
        .with_context(|| format!("invalid --since value '{since}'"))?;
    if value <= 0 {
        bail!("invalid --since value '{since}'");
    }
    let multiplier = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => bail!("invalid --since unit '{unit}' (use s, m, h, or d)"),
    };
    Ok(value * multiplier)
}
