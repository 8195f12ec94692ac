use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Article,
    Readability,
    Selector,
    FullPage,
    Wayback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Article => "article",
            ExtractionMethod::Readability => "readability",
            ExtractionMethod::Selector => "selector",
            ExtractionMethod::FullPage => "full_page",
            ExtractionMethod::Wayback => "wayback",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(ExtractionMethod::Article),
            "readability" => Ok(ExtractionMethod::Readability),
            "selector" => Ok(ExtractionMethod::Selector),
            "full_page" => Ok(ExtractionMethod::FullPage),
            "wayback" => Ok(ExtractionMethod::Wayback),
            other => Err(format!("unknown extraction method: {}", other)),
        }
    }
}

/// A rescued article as stored, keyed by normalized URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub status: String,
    pub tags: String,
    pub added_at: i64,
    pub scraped_at: DateTime<Utc>,
    pub content_location: Option<String>,
    pub content_length: i64,
    pub reading_time_estimate: i64,
    pub extraction_method: Option<ExtractionMethod>,
    pub archive_url: Option<String>,
    pub success: bool,
}

/// Write-side article record. The store keys it by normalized `url`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub status: String,
    pub tags: String,
    pub added_at: i64,
    pub scraped_at: DateTime<Utc>,
    pub content_location: Option<String>,
    pub content_length: i64,
    pub reading_time_estimate: i64,
    pub extraction_method: Option<ExtractionMethod>,
    pub archive_url: Option<String>,
    pub success: bool,
}

impl NewArticle {
    /// Words / 200, never below one minute.
    pub fn reading_time_for(text: &str) -> i64 {
        let words = text.split_whitespace().count() as i64;
        (words / 200).max(1)
    }
}

/// Filter for `Repository::query_articles`. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub status: Option<String>,
    pub success: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
