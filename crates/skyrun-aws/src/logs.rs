//! CloudWatch Logs-backed [`LogStore`].

use async_trait::async_trait;
use skyrun_core::provider::{LogPage, LogQuery, LogStore};
use skyrun_types::{LogEvent, Result};

use crate::error::{is_already_exists, map_sdk_err};

pub struct CloudWatchLogStore {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl CloudWatchLogStore {
    pub fn new(client: aws_sdk_cloudwatchlogs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogStore for CloudWatchLogStore {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        match self.client.create_log_group().log_group_name(group).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_already_exists(&err) => Ok(()),
            Err(err) => Err(map_sdk_err(err, "creating log group")),
        }
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        self.client
            .delete_log_group()
            .log_group_name(group)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting log group"))?;
        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<LogPage> {
        let response = self
            .client
            .filter_log_events()
            .log_group_name(&query.group)
            .set_start_time(query.start_ms)
            .set_end_time(query.end_ms)
            .set_filter_pattern(query.filter.clone())
            .set_next_token(query.next_token.clone())
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "querying log events"))?;

        let events = response
            .events()
            .iter()
            .filter_map(|event| {
                Some(LogEvent {
                    stream: event.log_stream_name()?.to_string(),
                    event_id: event.event_id()?.to_string(),
                    timestamp_ms: event.timestamp()?,
                    message: event.message().unwrap_or_default().to_string(),
                })
            })
            .collect();
        Ok(LogPage { events, next_token: response.next_token().map(str::to_string) })
    }
}
