use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::FetchError;
use crate::extract::ExtractionChain;
use crate::models::{FetchReport, SourceRecord};
use crate::urls::parse_http_url;

use super::article_writer::ArticleWriter;

/// Applies the extraction chain to many records through a fixed-size pool
/// of in-flight tasks. One record's failure never stops the batch.
pub struct FetchOrchestrator {
    chain: Arc<ExtractionChain>,
    writer: Arc<ArticleWriter>,
    timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(chain: Arc<ExtractionChain>, writer: Arc<ArticleWriter>, timeout: Duration) -> Self {
        Self {
            chain,
            writer,
            timeout,
        }
    }

    /// Fetch every record with at most `concurrency` in flight. Outcomes are
    /// consumed in completion order. Failed records are never written, so
    /// an earlier successful rescue of the same URL is left intact.
    pub async fn run(&self, records: Vec<SourceRecord>, concurrency: usize) -> FetchReport {
        let total = records.len();
        let mut report = FetchReport::default();

        let mut outcomes = stream::iter(records)
            .map(|record| async move {
                let outcome = self.process(&record).await;
                (record, outcome)
            })
            .buffer_unordered(concurrency.max(1));

        let mut done = 0;
        while let Some((record, outcome)) = outcomes.next().await {
            done += 1;
            match outcome {
                Ok(title) => {
                    report.record_success();
                    tracing::info!("OK [{}/{}] {}", done, total, title);
                }
                Err(reason) => {
                    tracing::warn!("FAILED [{}/{}] {} - {}", done, total, record.url, reason);
                    report.record_failure(&record.url, &record.title, reason);
                }
            }
        }

        tracing::info!(
            "Fetch completed: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }

    async fn process(&self, record: &SourceRecord) -> Result<String, FetchError> {
        parse_http_url(&record.url)?;

        let extracted = tokio::time::timeout(self.timeout, self.chain.extract(&record.url, &record.title))
            .await
            .map_err(|_| {
                FetchError::Network(format!("timed out after {}s", self.timeout.as_secs()))
            })??;

        self.writer.write(record, &extracted, None).await?;
        Ok(extracted.title)
    }
}
