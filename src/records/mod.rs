use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::PrioritizedArticle;
use crate::error::Result;
use crate::models::{Article, ReadingEntry, SourceRecord};
use crate::services::InvalidLink;

/// Read a bookmark export. Any malformed row fails the whole read.
pub fn read_source_records(path: &Path) -> Result<Vec<SourceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }

    tracing::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

#[derive(Serialize)]
struct InvalidLinkRow<'a> {
    url: &'a str,
    title: &'a str,
    status: &'a str,
    tags: &'a str,
    time_added: i64,
    status_code: u16,
    error: &'a str,
}

/// Write broken links in the source format plus `status_code,error`, so the
/// file can be fed straight back into recovery.
pub fn write_invalid_links(path: &Path, links: &[InvalidLink]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for link in links {
        writer.serialize(InvalidLinkRow {
            url: &link.record.url,
            title: &link.record.title,
            status: &link.record.status,
            tags: &link.record.tags,
            time_added: link.record.added_at,
            status_code: link.status_code,
            error: &link.error,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PriorityRow<'a> {
    priority_category: &'static str,
    priority_score: f64,
    title: &'a str,
    url: &'a str,
    tags: &'a str,
    status: &'a str,
    date_added: String,
}

fn date_added(epoch: i64) -> String {
    if epoch <= 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn export_priority_csv(path: &Path, articles: &[PrioritizedArticle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for article in articles {
        writer.serialize(PriorityRow {
            priority_category: article.priority.category.as_str(),
            priority_score: article.priority.score,
            title: &article.title,
            url: &article.url,
            tags: &article.tags,
            status: &article.status,
            date_added: date_added(article.added_at),
        })?;
    }
    writer.flush()?;
    tracing::info!("Exported {} prioritized articles to {}", articles.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct StoreRow<'a> {
    url: &'a str,
    title: &'a str,
    tags: &'a str,
    status: &'a str,
    time_added: i64,
}

/// Dump stored articles in the bookmark format, newest bookmark first, so
/// the store can be re-imported elsewhere.
pub fn export_store_csv(path: &Path, articles: &[Article]) -> Result<()> {
    let mut ordered: Vec<&Article> = articles.iter().collect();
    ordered.sort_by(|a, b| b.added_at.cmp(&a.added_at));

    let mut writer = csv::Writer::from_path(path)?;
    for article in ordered {
        writer.serialize(StoreRow {
            url: &article.url,
            title: &article.title,
            tags: &article.tags,
            status: &article.status,
            time_added: article.added_at,
        })?;
    }
    writer.flush()?;
    tracing::info!("Exported {} articles to {}", articles.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct ReadingRow<'a> {
    url: &'a str,
    title: &'a str,
    tags: &'a str,
    reading_time_estimate: i64,
    file_path: &'a str,
    reading_status: &'static str,
    progress_percent: i64,
    rating: Option<i64>,
    notes: &'a str,
    date_added: String,
    date_started: String,
    date_completed: String,
}

fn timestamp(epoch: Option<i64>) -> String {
    epoch
        .filter(|e| *e > 0)
        .and_then(|e| DateTime::<Utc>::from_timestamp(e, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn export_reading_csv(path: &Path, entries: &[ReadingEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for entry in entries {
        writer.serialize(ReadingRow {
            url: &entry.url,
            title: &entry.title,
            tags: &entry.tags,
            reading_time_estimate: entry.reading_time_estimate,
            file_path: entry.content_location.as_deref().unwrap_or_default(),
            reading_status: entry.status.as_str(),
            progress_percent: entry.progress_percent,
            rating: entry.rating,
            notes: entry.notes.as_deref().unwrap_or_default(),
            date_added: timestamp(Some(entry.added_at)),
            date_started: timestamp(entry.started_at),
            date_completed: timestamp(entry.completed_at),
        })?;
    }
    writer.flush()?;
    tracing::info!("Exported reading data for {} articles to {}", entries.len(), path.display());
    Ok(())
}
