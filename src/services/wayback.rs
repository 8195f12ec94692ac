use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Client;

use crate::config::RecoveryConfig;
use crate::error::{FetchError, Result};
use crate::extract::{Extracted, ExtractionChain};
use crate::models::{ExtractionMethod, FetchReport, SourceRecord};
use crate::urls::parse_http_url;

use super::article_writer::ArticleWriter;
use super::content_store::SnapshotSource;

const PLACEHOLDER_TITLE: &str = "Wayback Machine";
const ARCHIVED_TITLE: &str = "Archived Article";

fn toolbar_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--\s*BEGIN WAYBACK TOOLBAR INSERT\s*-->.*?<!--\s*END WAYBACK TOOLBAR INSERT\s*-->")
            .expect("toolbar pattern is valid")
    })
}

/// One archived capture of a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// `YYYYMMDDhhmmss`, as issued by the archive.
    pub timestamp: String,
    pub original: String,
    pub status: String,
    pub archive_url: String,
}

impl Snapshot {
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y%m%d%H%M%S")
            .ok()
            .map(|n| n.and_utc())
    }
}

/// Time-indexed snapshot service.
#[async_trait]
pub trait SnapshotIndex: Send + Sync {
    /// Up to `limit` captures answered with HTTP 200, most recent first.
    async fn snapshots(&self, url: &str, limit: usize) -> std::result::Result<Vec<Snapshot>, FetchError>;
}

/// Wayback Machine CDX API client.
pub struct WaybackClient {
    client: Client,
    cdx_endpoint: String,
    archive_base: String,
}

impl WaybackClient {
    pub fn new(config: &RecoveryConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pocket-rescue/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            cdx_endpoint: config.cdx_endpoint.trim_end_matches('/').to_string(),
            archive_base: config.archive_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SnapshotIndex for WaybackClient {
    async fn snapshots(&self, url: &str, limit: usize) -> std::result::Result<Vec<Snapshot>, FetchError> {
        // A negative limit asks the CDX server for the newest captures.
        let query = format!(
            "{}?url={}&output=json&filter=statuscode:200&limit=-{}",
            self.cdx_endpoint,
            urlencoding::encode(url),
            limit
        );

        let response = self.client.get(&query).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "snapshot search returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        Ok(parse_cdx(&body, &self.archive_base, limit))
    }
}

/// Parse a CDX JSON answer (header row first) into snapshots, newest
/// first, keeping only HTTP 200 captures.
pub fn parse_cdx(body: &str, archive_base: &str, limit: usize) -> Vec<Snapshot> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    let rows: Vec<Vec<String>> = match serde_json::from_str(body) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("Unreadable snapshot listing: {}", e);
            return Vec::new();
        }
    };
    let Some((header, captures)) = rows.split_first() else {
        return Vec::new();
    };

    let column = |name: &str, fallback: usize| {
        header.iter().position(|h| h == name).unwrap_or(fallback)
    };
    let ts_col = column("timestamp", 1);
    let original_col = column("original", 2);
    let status_col = column("statuscode", 4);

    let mut snapshots: Vec<Snapshot> = captures
        .iter()
        .filter_map(|row| {
            let timestamp = row.get(ts_col)?.clone();
            let original = row.get(original_col)?.clone();
            let status = row.get(status_col).cloned().unwrap_or_default();
            Some(Snapshot {
                archive_url: format!("{}/{}/{}", archive_base, timestamp, original),
                timestamp,
                original,
                status,
            })
        })
        .filter(|s| s.status == "200")
        .collect();

    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    snapshots.truncate(limit);
    snapshots
}

/// Strip the toolbar the archive injects into every capture.
pub fn strip_archive_chrome(html: &str) -> String {
    toolbar_block().replace_all(html, "").into_owned()
}

/// Title for a recovered article: the extracted title unless it is blank or
/// the archive's own placeholder, then the original title, then a label.
pub fn recovered_title(extracted: &str, original: &str) -> String {
    let extracted = extracted.trim();
    if !extracted.is_empty() && !extracted.contains(PLACEHOLDER_TITLE) {
        return extracted.to_string();
    }
    let original = original.trim();
    if original.is_empty() {
        ARCHIVED_TITLE.to_string()
    } else {
        original.to_string()
    }
}

/// Sequential, rate-limited recovery of dead links from archived
/// snapshots. Never runs records in parallel.
pub struct RecoveryResolver {
    index: Arc<dyn SnapshotIndex>,
    chain: Arc<ExtractionChain>,
    writer: Arc<ArticleWriter>,
    config: RecoveryConfig,
}

impl RecoveryResolver {
    pub fn new(
        index: Arc<dyn SnapshotIndex>,
        chain: Arc<ExtractionChain>,
        writer: Arc<ArticleWriter>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            index,
            chain,
            writer,
            config,
        }
    }

    pub async fn recover(&self, records: &[SourceRecord]) -> FetchReport {
        let mut report = FetchReport::default();
        let total = records.len();

        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.record_delay()).await;
            }

            tracing::info!("[{}/{}] Searching archive for {}", i + 1, total, record.url);
            match self.recover_one(record).await {
                Ok(title) => {
                    report.record_success();
                    tracing::info!("Recovered: {}", title);
                }
                Err(reason) => {
                    tracing::warn!("Not recovered: {} - {}", record.url, reason);
                    report.record_failure(&record.url, &record.title, reason);
                }
            }
        }

        tracing::info!(
            "Archive recovery completed: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }

    async fn recover_one(&self, record: &SourceRecord) -> std::result::Result<String, FetchError> {
        parse_http_url(&record.url)?;

        let snapshots = self
            .index
            .snapshots(&record.url, self.config.snapshot_limit.max(1))
            .await?;
        if snapshots.is_empty() {
            return Err(FetchError::NoSnapshotFound);
        }

        for (i, snapshot) in snapshots.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.snapshot_delay()).await;
            }
            tracing::debug!("Trying snapshot from {}", snapshot.timestamp);

            let html = match self.chain.fetcher().fetch_page(&snapshot.archive_url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::debug!("Snapshot {} unavailable: {}", snapshot.archive_url, e);
                    continue;
                }
            };

            let extracted = match self.chain.extract_html(strip_archive_chrome(&html), "").await {
                Ok(extracted) => extracted,
                Err(_) => continue,
            };

            let recovered = Extracted {
                title: recovered_title(&extracted.title, &record.title),
                text: extracted.text,
                method: ExtractionMethod::Wayback,
            };
            let source = SnapshotSource {
                archive_url: snapshot.archive_url.clone(),
                captured_at: snapshot.captured_at(),
            };
            self.writer.write(record, &recovered, Some(&source)).await?;
            return Ok(recovered.title);
        }

        Err(FetchError::RecoveryExhausted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::config::ExtractionConfig;
    use crate::db::Repository;
    use crate::services::{ContentStore, FetchOrchestrator, PageFetcher};

    const ARCHIVE: &str = "http://web.archive.org/web";

    struct FakeArchive {
        snapshots: HashMap<String, Vec<Snapshot>>,
    }

    #[async_trait]
    impl SnapshotIndex for FakeArchive {
        async fn snapshots(&self, url: &str, limit: usize) -> std::result::Result<Vec<Snapshot>, FetchError> {
            let mut found = self.snapshots.get(url).cloned().unwrap_or_default();
            found.truncate(limit);
            Ok(found)
        }
    }

    struct FakeWeb {
        pages: HashMap<String, String>,
        fetched: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl PageFetcher for FakeWeb {
        async fn fetch_page(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.fetched.lock().unwrap().push((url.to_string(), Instant::now()));
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Network("connection failed".into()))
        }

        async fn check_status(&self, url: &str) -> std::result::Result<u16, FetchError> {
            Ok(if self.pages.contains_key(url) { 200 } else { 0 })
        }
    }

    fn snapshot(timestamp: &str, url: &str) -> Snapshot {
        Snapshot {
            timestamp: timestamp.to_string(),
            original: url.to_string(),
            status: "200".to_string(),
            archive_url: format!("{}/{}/{}", ARCHIVE, timestamp, url),
        }
    }

    fn archived_page(title: &str, text: &str) -> String {
        format!(
            r#"<html><head><title>{}</title></head><body>
               <!-- BEGIN WAYBACK TOOLBAR INSERT --><div id="wm-ipp-base">Wayback Machine toolbar</div><!-- END WAYBACK TOOLBAR INSERT -->
               <article><p>{}</p></article></body></html>"#,
            title,
            format!("{} ", text).repeat(30)
        )
    }

    struct Harness {
        repository: Arc<Repository>,
        writer: Arc<ArticleWriter>,
        chain: Arc<ExtractionChain>,
        web: Arc<FakeWeb>,
        _dir: tempfile::TempDir,
    }

    async fn harness(pages: Vec<(String, String)>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(Repository::open_in_memory().await.unwrap());
        let writer = Arc::new(ArticleWriter::new(
            Arc::clone(&repository),
            ContentStore::new(dir.path()),
        ));
        let web = Arc::new(FakeWeb {
            pages: pages.into_iter().collect(),
            fetched: Mutex::new(Vec::new()),
        });
        let chain = Arc::new(ExtractionChain::new(
            Arc::clone(&web) as Arc<dyn PageFetcher>,
            &ExtractionConfig::default(),
        ));
        Harness {
            repository,
            writer,
            chain,
            web,
            _dir: dir,
        }
    }

    fn resolver(h: &Harness, snapshots: Vec<(&str, Vec<Snapshot>)>) -> RecoveryResolver {
        let archive = FakeArchive {
            snapshots: snapshots
                .into_iter()
                .map(|(u, s)| (u.to_string(), s))
                .collect(),
        };
        RecoveryResolver::new(
            Arc::new(archive),
            Arc::clone(&h.chain),
            Arc::clone(&h.writer),
            RecoveryConfig::default(),
        )
    }

    #[tokio::test]
    async fn dead_link_is_recovered_from_archive() {
        let url = "https://gone.example/essay";
        let snap = snapshot("20210304050607", url);
        let h = harness(vec![(
            snap.archive_url.clone(),
            archived_page("The Essay", "archived words survive"),
        )])
        .await;
        let record = SourceRecord::new(url, "Essay", "writing", "unread", 0);

        // The live fetch fails and writes nothing.
        let orchestrator =
            FetchOrchestrator::new(Arc::clone(&h.chain), Arc::clone(&h.writer), Duration::from_secs(10));
        let live = orchestrator.run(vec![record.clone()], 2).await;
        assert_eq!(live.failed, 1);
        assert!(h.repository.get_article_by_url(url).await.unwrap().is_none());

        let report = resolver(&h, vec![(url, vec![snap.clone()])])
            .recover(&[record])
            .await;
        assert_eq!(report.succeeded, 1);

        let article = h.repository.get_article_by_url(url).await.unwrap().unwrap();
        assert_eq!(article.extraction_method, Some(ExtractionMethod::Wayback));
        assert_eq!(article.archive_url.as_deref(), Some(snap.archive_url.as_str()));
        assert_eq!(article.title, "The Essay");
        assert!(article.success);

        let location = article.content_location.unwrap();
        assert!(location.contains("wayback_archived"));
        let saved = std::fs::read_to_string(location).unwrap();
        assert!(saved.contains("**Snapshot Date:** 2021-03-04 05:06:07"));
        assert!(!saved.contains("toolbar"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_snapshots_are_reported() {
        let h = harness(vec![]).await;
        let record = SourceRecord::new("https://gone.example/", "Gone", "", "unread", 0);

        let report = resolver(&h, vec![]).recover(&[record]).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].reason, FetchError::NoSnapshotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_older_snapshot_then_exhausts() {
        let url = "https://gone.example/post";
        let newest = snapshot("20230101000000", url);
        let older = snapshot("20190101000000", url);
        let h = harness(vec![
            (newest.archive_url.clone(), "<html><body><p>Tiny</p></body></html>".to_string()),
            (older.archive_url.clone(), archived_page("Wayback Machine", "older but complete text")),
        ])
        .await;

        let record = SourceRecord::new(url, "Original Post", "", "unread", 0);
        let started = Instant::now();
        let report = resolver(&h, vec![(url, vec![newest.clone(), older.clone()])])
            .recover(&[record])
            .await;
        assert_eq!(report.succeeded, 1);
        assert!(started.elapsed() >= Duration::from_secs(1));
        let article = h.repository.get_article_by_url(url).await.unwrap().unwrap();
        assert_eq!(article.archive_url.as_deref(), Some(older.archive_url.as_str()));
        assert_eq!(article.title, "Original Post");

        let other = "https://gone.example/short";
        let only = snapshot("20200101000000", other);
        let h = harness(vec![(only.archive_url.clone(), "<p>short</p>".to_string())]).await;
        let record = SourceRecord::new(other, "Short", "", "unread", 0);
        let report = resolver(&h, vec![(other, vec![only])]).recover(&[record]).await;
        assert_eq!(report.failures[0].reason, FetchError::RecoveryExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_waits_between_snapshots_and_records() {
        let urls = [
            "https://gone.example/one",
            "https://gone.example/two",
            "https://gone.example/three",
        ];
        let mut pages = Vec::new();
        let mut snapshots = Vec::new();
        for url in urls {
            let newest = snapshot("20230101000000", url);
            let older = snapshot("20200101000000", url);
            pages.push((newest.archive_url.clone(), "<p>stub</p>".to_string()));
            pages.push((older.archive_url.clone(), archived_page("Kept", "complete archived text")));
            snapshots.push((url, vec![newest, older]));
        }
        let h = harness(pages).await;
        let records: Vec<SourceRecord> = urls
            .iter()
            .map(|u| SourceRecord::new(u, "Post", "", "unread", 0))
            .collect();

        let started = Instant::now();
        let report = resolver(&h, snapshots).recover(&records).await;
        let elapsed = started.elapsed();
        assert_eq!(report.succeeded, 3);

        // 2s between each of 3 records, 1s between the 2 snapshots of each.
        assert!(elapsed >= Duration::from_secs(2 * 2 + 3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);

        let fetched = h.web.fetched.lock().unwrap().clone();
        let order: Vec<&str> = fetched
            .iter()
            .map(|(u, _)| u.rsplit_once("/gone.example/").map_or("", |(_, path)| path))
            .collect();
        assert_eq!(order, vec!["one", "one", "two", "two", "three", "three"]);

        for pair in fetched.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_secs(1), "gap {:?}", gap);
        }
        for (i, j) in [(1, 2), (3, 4)] {
            assert!(fetched[j].1 - fetched[i].1 >= Duration::from_secs(2));
        }
    }

    #[test]
    fn placeholder_and_blank_titles_fall_back() {
        assert_eq!(recovered_title("Real title", "Orig"), "Real title");
        assert_eq!(recovered_title("Wayback Machine", "Orig"), "Orig");
        assert_eq!(recovered_title("  ", "Orig"), "Orig");
        assert_eq!(recovered_title("", ""), "Archived Article");
    }

    #[test]
    fn cdx_rows_become_newest_first_snapshots() {
        let body = r#"[
            ["urlkey","timestamp","original","mimetype","statuscode","digest","length"],
            ["com,example)/a","20190101000000","https://example.com/a","text/html","200","X","1"],
            ["com,example)/a","20220101000000","https://example.com/a","text/html","200","Y","1"],
            ["com,example)/a","20210101000000","https://example.com/a","text/html","301","Z","1"]
        ]"#;

        let snapshots = parse_cdx(body, ARCHIVE, 5);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].timestamp, "20220101000000");
        assert_eq!(
            snapshots[0].archive_url,
            "http://web.archive.org/web/20220101000000/https://example.com/a"
        );
        assert_eq!(parse_cdx(body, ARCHIVE, 1).len(), 1);
        assert!(parse_cdx("", ARCHIVE, 5).is_empty());
        assert!(parse_cdx("[]", ARCHIVE, 5).is_empty());
    }

    #[test]
    fn toolbar_insert_is_removed() {
        let html = "<body><!-- BEGIN WAYBACK TOOLBAR INSERT -->\n<div>bar</div>\n<!-- END WAYBACK TOOLBAR INSERT --><p>kept</p></body>";
        assert_eq!(strip_archive_chrome(html), "<body><p>kept</p></body>");
    }
}
