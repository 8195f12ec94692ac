use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::FetchError;

#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub url: String,
    pub title: String,
    pub reason: FetchError,
}

/// Aggregate outcome of a fetch or recovery batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedRecord>,
}

impl FetchReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, url: &str, title: &str, reason: FetchError) {
        self.failed += 1;
        self.failures.push(FailedRecord {
            url: url.to_string(),
            title: title.to_string(),
            reason,
        });
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Failure counts keyed by error kind.
    pub fn failure_kinds(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.reason.kind()).or_insert(0) += 1;
        }
        counts
    }
}
