//! Log retrieval and live tailing.
//!
//! `fetch` drains every page of a time range once. `tail` polls the
//! same query from an advancing cursor, deduplicating at the cursor
//! boundary so each event is delivered exactly once, in
//! (timestamp, stream) order, until cancelled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use skyrun_types::{LogEvent, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::provider::{LogQuery, LogStore};
use crate::retry::with_transient_retries;

/// How far behind "now" the tail cursor starts, to cover ingestion lag.
const TAIL_LOOKBACK_MS: i64 = 10_000;
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLL_ATTEMPTS: u32 = 3;

/// One-shot retrieval parameters.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub group: String,
    /// Inclusive lower bound, epoch milliseconds.
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    /// Provider-side filter pattern.
    pub filter: Option<String>,
    /// Restrict to streams whose name contains this task id.
    pub task_id: Option<String>,
}

/// Tail parameters; the time range is managed by the cursor.
#[derive(Debug, Clone, Default)]
pub struct TailOptions {
    pub group: String,
    pub filter: Option<String>,
    pub task_id: Option<String>,
}

/// Reads task logs from the log store.
pub struct LogTailer {
    logs: Arc<dyn LogStore>,
}

impl LogTailer {
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self { logs }
    }

    /// Fetch every matching event in the range, merged across streams
    /// in (timestamp, stream) order with duplicates removed.
    pub async fn fetch(&self, opts: &FetchOptions) -> Result<Vec<LogEvent>> {
        let mut events = self
            .fetch_pages(&opts.group, opts.start_ms, opts.end_ms, opts.filter.as_deref())
            .await?;
        if let Some(task_id) = &opts.task_id {
            events.retain(|e| e.stream.contains(task_id.as_str()));
        }
        sort_events(&mut events);
        dedupe_events(&mut events);
        Ok(events)
    }

    /// Poll the group until `cancel` fires or the receiver is dropped,
    /// sending each new event through `tx` exactly once.
    ///
    /// Transient query failures are retried up to 3 times per poll,
    /// then surfaced.
    pub async fn tail(
        &self,
        opts: &TailOptions,
        cancel: CancellationToken,
        tx: mpsc::Sender<LogEvent>,
    ) -> Result<()> {
        let mut cursor = Utc::now().timestamp_millis() - TAIL_LOOKBACK_MS;
        // Events already delivered at exactly `cursor`, so the next
        // inclusive query does not replay them.
        let mut boundary: HashSet<(String, String)> = HashSet::new();

        tracing::debug!(group = %opts.group, cursor, "tail started");
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let mut events = with_transient_retries(MAX_POLL_ATTEMPTS, || {
                self.fetch_pages(&opts.group, Some(cursor), None, opts.filter.as_deref())
            })
            .await?;
            if let Some(task_id) = &opts.task_id {
                events.retain(|e| e.stream.contains(task_id.as_str()));
            }
            events.retain(|e| {
                e.timestamp_ms > cursor
                    || (e.timestamp_ms == cursor
                        && !boundary.contains(&(e.stream.clone(), e.event_id.clone())))
            });
            sort_events(&mut events);

            for event in events {
                if event.timestamp_ms > cursor {
                    cursor = event.timestamp_ms;
                    boundary.clear();
                }
                if !boundary.insert((event.stream.clone(), event.event_id.clone())) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    // Receiver gone; stop quietly.
                    return Ok(());
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Drain every page of one query.
    async fn fetch_pages(
        &self,
        group: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        filter: Option<&str>,
    ) -> Result<Vec<LogEvent>> {
        let mut events = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .logs
                .query(&LogQuery {
                    group: group.to_string(),
                    start_ms,
                    end_ms,
                    filter: filter.map(str::to_string),
                    next_token,
                })
                .await?;
            events.extend(page.events);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(events),
            }
        }
    }
}

fn sort_events(events: &mut [LogEvent]) {
    events.sort_by(|a, b| {
        (a.timestamp_ms, a.stream.as_str()).cmp(&(b.timestamp_ms, b.stream.as_str()))
    });
}

fn dedupe_events(events: &mut Vec<LogEvent>) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    events.retain(|e| seen.insert((e.stream.clone(), e.event_id.clone())));
}
