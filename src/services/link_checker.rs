use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::FetchError;
use crate::models::SourceRecord;

use super::content_fetcher::PageFetcher;

/// A record whose link did not answer with a 2xx status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidLink {
    pub record: SourceRecord,
    /// 0 when no HTTP response was received.
    pub status_code: u16,
    pub error: String,
}

pub struct LinkChecker {
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
}

impl LinkChecker {
    pub fn new(fetcher: Arc<dyn PageFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Check every record with at most `concurrency` requests in flight and
    /// return the broken ones in completion order.
    pub async fn check_links(&self, records: Vec<SourceRecord>, concurrency: usize) -> Vec<InvalidLink> {
        let total = records.len();
        let mut invalid = Vec::new();

        let mut results = stream::iter(records)
            .map(|record| async move {
                let outcome = self.check(&record.url).await;
                (record, outcome)
            })
            .buffer_unordered(concurrency.max(1));

        let mut done = 0;
        while let Some((record, outcome)) = results.next().await {
            done += 1;
            if done % 50 == 0 || done == total {
                tracing::info!("Processed: {}/{}", done, total);
            }
            if let Some((status_code, error)) = outcome {
                tracing::warn!(
                    "INVALID: {} - Status: {} - Error: {}",
                    record.url,
                    status_code,
                    error
                );
                invalid.push(InvalidLink {
                    record,
                    status_code,
                    error,
                });
            }
        }

        invalid
    }

    /// `None` for a healthy link, otherwise the status and error text.
    async fn check(&self, url: &str) -> Option<(u16, String)> {
        let outcome = tokio::time::timeout(self.timeout, self.fetcher.check_status(url)).await;
        match outcome {
            Err(_) => Some((0, "Timeout".to_string())),
            Ok(Ok(status)) if (200..300).contains(&status) => None,
            Ok(Ok(status)) => Some((status, String::new())),
            Ok(Err(FetchError::InvalidUrl(_))) => Some((0, "Invalid URL format".to_string())),
            Ok(Err(FetchError::Network(reason))) => Some((0, describe_network_error(&reason))),
            Ok(Err(other)) => Some((0, other.to_string())),
        }
    }
}

fn describe_network_error(reason: &str) -> String {
    match reason {
        "timeout" => "Timeout".to_string(),
        "connection failed" => "Connection error".to_string(),
        "too many redirects" => "Too many redirects".to_string(),
        other => format!("Request error: {}", other),
    }
}
