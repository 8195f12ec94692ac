use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::SourceRecord;
use crate::urls::host_of;

pub const UNTAGGED_BUCKET: &str = "untagged";
pub const ARCHIVE_BUCKET: &str = "wayback_archived";

const MAX_STEM_CHARS: usize = 100;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("filename pattern is valid"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Where a recovered article came from.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    pub archive_url: String,
    pub captured_at: Option<DateTime<Utc>>,
}

/// Saved-content document: heading, metadata lines, separator, body.
pub fn render_artifact(
    title: &str,
    record: &SourceRecord,
    snapshot: Option<&SnapshotSource>,
    body: &str,
) -> String {
    let mut doc = format!("# {}\n\n", title);

    doc.push_str(&format!("**Original URL:** {}\n", record.url));
    if let Some(snapshot) = snapshot {
        doc.push_str(&format!("**Archive URL:** {}\n", snapshot.archive_url));
        if let Some(captured) = snapshot.captured_at {
            doc.push_str(&format!(
                "**Snapshot Date:** {}\n",
                captured.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
    doc.push_str(&format!("**Tags:** {}\n", record.tags));
    doc.push_str(&format!("**Date Added:** {}\n", format_epoch(record.added_at)));
    if snapshot.is_some() {
        doc.push_str(&format!("**Status:** {} (recovered from archive)\n", record.status));
    } else {
        doc.push_str(&format!("**Status:** {}\n", record.status));
    }

    doc.push_str("\n---\n\n");
    doc.push_str(body);
    doc.push('\n');
    doc
}

fn format_epoch(epoch: i64) -> String {
    if epoch <= 0 {
        return "unknown".to_string();
    }
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn clean_segment(raw: &str) -> String {
    let cleaned = unsafe_chars().replace_all(raw.trim(), "");
    whitespace_run().replace_all(cleaned.trim(), "_").to_string()
}

/// Filesystem-safe stem: cleaned title plus a short hash of the article
/// key (its normalized URL).
/// `empty_fallback` stands in when neither title nor host is usable.
pub fn file_stem(title: &str, url: &str, empty_fallback: &str) -> String {
    let mut base = clean_segment(title);
    if base.is_empty() {
        base = host_of(url).map(|h| clean_segment(&h)).unwrap_or_default();
    }
    if base.is_empty() {
        base = empty_fallback.to_string();
    }
    let base: String = base.chars().take(MAX_STEM_CHARS).collect();
    format!("{}_{}", base, url_hash(url))
}

/// First 8 hex characters of SHA-256(url).
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Folder for a record: its first tag, or `untagged`.
pub fn bucket_for(record: &SourceRecord) -> String {
    let bucket = record
        .first_tag()
        .map(clean_segment)
        .map(|b| b.trim_start_matches('.').to_string())
        .unwrap_or_default();
    if bucket.is_empty() {
        UNTAGGED_BUCKET.to_string()
    } else {
        bucket
    }
}

/// Saved article artifacts on disk, one markdown file per article.
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `document` to `<root>/<bucket>/<stem>.md`, replacing any
    /// previous artifact for the same article.
    pub async fn save(&self, bucket: &str, stem: &str, document: &str) -> Result<PathBuf> {
        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.md", stem));
        tokio::fs::write(&path, document).await?;
        Ok(path)
    }

    pub async fn read(&self, location: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(location).await?)
    }

    pub async fn remove(&self, location: &str) -> Result<()> {
        tokio::fs::remove_file(location).await?;
        Ok(())
    }
}
