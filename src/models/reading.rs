use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the reader is with a saved article. Articles without a progress
/// row count as `Unread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    Unread,
    Reading,
    Completed,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Unread => "unread",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unread" => Ok(ReadingStatus::Unread),
            "reading" => Ok(ReadingStatus::Reading),
            "completed" | "done" => Ok(ReadingStatus::Completed),
            other => Err(format!("unknown reading status: {}", other)),
        }
    }
}

/// Status change plus the optional fields to overwrite with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingUpdate {
    pub status: ReadingStatus,
    /// 0..=100
    pub progress: Option<u8>,
    pub notes: Option<String>,
    /// 1..=5
    pub rating: Option<u8>,
}

impl ReadingUpdate {
    pub fn new(status: ReadingStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// A successful article joined with its reading progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingEntry {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub tags: String,
    pub reading_time_estimate: i64,
    pub content_location: Option<String>,
    pub added_at: i64,
    pub status: ReadingStatus,
    pub progress_percent: i64,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingStats {
    pub total_articles: i64,
    /// Every status with its count, unread included.
    pub by_status: Vec<(ReadingStatus, i64)>,
    pub total_reading_minutes: i64,
    /// Mean rating to one decimal place.
    pub average_rating: Option<f64>,
    pub top_tags: Vec<(String, i64)>,
}

impl ReadingStats {
    pub fn total_reading_hours(&self) -> f64 {
        (self.total_reading_minutes as f64 / 60.0 * 10.0).round() / 10.0
    }
}

/// Rows removed by a store cleanup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub failed_articles: usize,
    pub orphaned_progress: usize,
    pub orphaned_sessions: usize,
}
