use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::analysis::{
    find_duplicates, resolve, DuplicateCandidate, PrioritizedArticle, PriorityScorer,
    ResolutionReport, SearchHit, SearchIndex, DEFAULT_RESULT_LIMIT,
};
use crate::config::Config;
use crate::db::{Repository, StoreStats};
use crate::error::{AppError, Result};
use crate::extract::ExtractionChain;
use crate::models::{
    Article, ArticleQuery, CleanupReport, FetchReport, ReadingEntry, ReadingStats, ReadingStatus,
    ReadingUpdate, SourceRecord,
};
use crate::records::{
    export_priority_csv, export_reading_csv, export_store_csv, read_source_records,
    write_invalid_links,
};
use crate::services::{
    ArticleWriter, ContentFetcher, ContentStore, FetchOrchestrator, InvalidLink, LinkChecker,
    PageFetcher, RecoveryResolver, WaybackClient,
};

const LINK_CHECK_WORKERS: usize = 20;

/// Wires configuration, store and network services together for the
/// command-line entry points.
pub struct App {
    config: Config,
    pub repository: Arc<Repository>,
    fetcher: Arc<dyn PageFetcher>,
    chain: Arc<ExtractionChain>,
    writer: Arc<ArticleWriter>,
}

pub struct DuplicateScan {
    pub candidates: Vec<DuplicateCandidate>,
    pub resolution: Option<ResolutionReport>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        if config.data_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("data_dir is not set in {}", Config::config_path().display()).into());
        }
        std::fs::create_dir_all(&config.data_dir)?;
        let repository = Arc::new(Repository::new(&config.db_path()).await?);

        let fetcher: Arc<dyn PageFetcher> = Arc::new(ContentFetcher::new(
            &config.fetch.user_agent,
            config.fetch.timeout(),
        )?);
        let chain = Arc::new(ExtractionChain::new(Arc::clone(&fetcher), &config.extraction));
        let writer = Arc::new(ArticleWriter::new(
            Arc::clone(&repository),
            ContentStore::new(config.content_dir()),
        ));

        Ok(Self {
            config,
            repository,
            fetcher,
            chain,
            writer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn fetch(
        &self,
        csv_path: &Path,
        workers: Option<usize>,
        include_archived: bool,
    ) -> Result<FetchReport> {
        let records = read_source_records(csv_path)?;
        let records = self.filter_archived(records, include_archived || self.config.fetch.include_archived);

        let orchestrator = FetchOrchestrator::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.writer),
            self.config.fetch.timeout(),
        );
        let concurrency = workers.unwrap_or(self.config.fetch.concurrency);
        tracing::info!("Fetching {} articles with {} workers", records.len(), concurrency);

        Ok(orchestrator.run(records, concurrency).await)
    }

    fn filter_archived(&self, records: Vec<SourceRecord>, include_archived: bool) -> Vec<SourceRecord> {
        if include_archived {
            return records;
        }
        let total = records.len();
        let kept: Vec<SourceRecord> = records.into_iter().filter(|r| !r.is_archived()).collect();
        if kept.len() < total {
            tracing::info!("Skipping {} archived records", total - kept.len());
        }
        kept
    }

    pub async fn check_links(&self, csv_path: &Path, output: &Path) -> Result<Vec<InvalidLink>> {
        let records = read_source_records(csv_path)?;
        let checker = LinkChecker::new(Arc::clone(&self.fetcher), self.config.fetch.timeout());
        let invalid = checker.check_links(records, LINK_CHECK_WORKERS).await;

        write_invalid_links(output, &invalid)?;
        tracing::info!("Saved {} invalid links to {}", invalid.len(), output.display());
        Ok(invalid)
    }

    pub async fn recover(&self, csv_path: &Path) -> Result<FetchReport> {
        let records = read_source_records(csv_path)?;
        let index = Arc::new(WaybackClient::new(&self.config.recovery, self.config.fetch.timeout())?);
        let resolver = RecoveryResolver::new(
            index,
            Arc::clone(&self.chain),
            Arc::clone(&self.writer),
            self.config.recovery.clone(),
        );
        Ok(resolver.recover(&records).await)
    }

    /// Rebuild the search index from the store and save it.
    pub async fn build_index(&self) -> Result<SearchIndex> {
        let index = SearchIndex::build_from_store(&self.repository, self.writer.store()).await?;
        index.save(&self.config.search_index_path()).await?;
        Ok(index)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let path = self.config.search_index_path();
        let index = if path.exists() {
            SearchIndex::load(&path).await?
        } else {
            tracing::info!("No search index found, building one");
            self.build_index().await?
        };
        if index.is_empty() {
            tracing::warn!("Search index is empty, fetch some articles first");
        }
        Ok(index.query(query, DEFAULT_RESULT_LIMIT))
    }

    pub fn prioritize(&self, csv_path: &Path, export: Option<&Path>) -> Result<Vec<PrioritizedArticle>> {
        let records = read_source_records(csv_path)?;
        let scorer = PriorityScorer::new(self.config.priority.clone());
        let ranked = scorer.analyze(&records, Utc::now());

        if let Some(path) = export {
            export_priority_csv(path, &ranked)?;
        }
        Ok(ranked)
    }

    pub async fn duplicates(&self, clean: bool, keep_first: bool) -> Result<DuplicateScan> {
        let articles = self.repository.successful_articles().await?;
        let candidates = find_duplicates(&articles);

        let resolution = if clean && !candidates.is_empty() {
            Some(resolve(&self.repository, self.writer.store(), &candidates, keep_first).await?)
        } else {
            None
        };

        Ok(DuplicateScan {
            candidates,
            resolution,
        })
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.repository.stats().await
    }

    async fn article_for(&self, url: &str) -> Result<Article> {
        self.repository
            .get_article_by_url(url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("article {}", url)))
    }

    pub async fn mark(&self, url: &str, update: ReadingUpdate) -> Result<Article> {
        let article = self.article_for(url).await?;
        let status = update.status;
        self.repository
            .update_reading_status(article.id, update, Utc::now())
            .await?;
        tracing::info!("Marked '{}' as {}", article.title, status);
        Ok(article)
    }

    pub async fn reading_list(
        &self,
        status: Option<ReadingStatus>,
        tag: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<ReadingEntry>> {
        self.repository.reading_list(status, tag, limit).await
    }

    pub async fn start_session(&self, url: &str) -> Result<(Article, i64)> {
        let article = self.article_for(url).await?;
        let session = self.repository.start_session(article.id, Utc::now()).await?;
        Ok((article, session))
    }

    /// Returns the session length in minutes.
    pub async fn end_session(&self, session: i64, notes: Option<String>) -> Result<i64> {
        self.repository
            .end_session(session, notes, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reading session {}", session)))
    }

    pub async fn reading_stats(&self) -> Result<ReadingStats> {
        self.repository.reading_stats().await
    }

    /// Write the store (or, with `reading`, every article's reading state)
    /// to CSV. Returns the number of rows written.
    pub async fn export(&self, path: &Path, reading: bool) -> Result<usize> {
        if reading {
            let entries = self.repository.reading_list(None, None, None).await?;
            export_reading_csv(path, &entries)?;
            Ok(entries.len())
        } else {
            let articles = self.repository.query_articles(ArticleQuery::default()).await?;
            export_store_csv(path, &articles)?;
            Ok(articles.len())
        }
    }

    pub async fn cleanup(&self, remove_failed: bool) -> Result<CleanupReport> {
        let report = self.repository.cleanup(remove_failed).await?;
        tracing::info!(
            "Cleanup removed {} failed articles, {} progress rows, {} sessions",
            report.failed_articles,
            report.orphaned_progress,
            report.orphaned_sessions
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn app_in(dir: &Path) -> App {
        let config = Config {
            data_dir: dir.join("data").to_string_lossy().to_string(),
            ..Config::default()
        };
        App::new(config).await.unwrap()
    }

    fn write_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("bookmarks.csv");
        std::fs::write(
            &path,
            "url,title,status,tags,time_added\n\
             https://a.example/,Alpha,unread,programming|_reading,0\n\
             https://b.example/,Beta,archive,archive,0\n",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn prioritize_ranks_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;
        let csv = write_csv(dir.path());
        let export = dir.path().join("priority.csv");

        let ranked = app.prioritize(&csv, Some(&export)).unwrap();
        assert_eq!(ranked[0].title, "Alpha");
        assert_eq!(ranked[0].priority.score, 71.0);
        assert!(export.exists());
    }

    #[tokio::test]
    async fn archived_records_are_filtered_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;
        let records = read_source_records(&write_csv(dir.path())).unwrap();

        assert_eq!(app.filter_archived(records.clone(), false).len(), 1);
        assert_eq!(app.filter_archived(records, true).len(), 2);
    }

    #[tokio::test]
    async fn search_on_empty_store_builds_and_saves_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;

        let hits = tokio_test::assert_ok!(app.search("anything").await);
        assert!(hits.is_empty());
        assert!(app.config().search_index_path().exists());

        let stats = app.stats().await.unwrap();
        assert_eq!(stats.total_articles, 0);

        let scan = app.duplicates(true, true).await.unwrap();
        assert!(scan.candidates.is_empty());
        assert!(scan.resolution.is_none());
    }

    #[tokio::test]
    async fn reading_commands_resolve_urls_and_export() {
        use crate::models::NewArticle;

        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;
        app.repository
            .upsert_article(NewArticle {
                url: "https://a.example/post".to_string(),
                title: "Post".to_string(),
                status: "unread".to_string(),
                tags: "rust".to_string(),
                added_at: 1_700_000_000,
                scraped_at: Utc::now(),
                content_location: None,
                content_length: 900,
                reading_time_estimate: 1,
                extraction_method: None,
                archive_url: None,
                success: true,
            })
            .await
            .unwrap();

        let missing = app
            .mark("https://nowhere.example/", ReadingUpdate::new(ReadingStatus::Reading))
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        // Lookup goes through the normalized key.
        let marked = app
            .mark("https://A.example/post/", ReadingUpdate::new(ReadingStatus::Reading))
            .await
            .unwrap();
        assert_eq!(marked.title, "Post");

        let (_, session) = app.start_session("https://a.example/post").await.unwrap();
        assert_eq!(app.end_session(session, None).await.unwrap(), 0);
        assert!(matches!(app.end_session(session + 1, None).await, Err(AppError::NotFound(_))));

        let reading = app
            .reading_list(Some(ReadingStatus::Reading), None, None)
            .await
            .unwrap();
        assert_eq!(reading.len(), 1);

        let store_csv = dir.path().join("store.csv");
        assert_eq!(app.export(&store_csv, false).await.unwrap(), 1);
        assert_eq!(read_source_records(&store_csv).unwrap()[0].url, "https://a.example/post");

        let reading_csv = dir.path().join("reading.csv");
        assert_eq!(app.export(&reading_csv, true).await.unwrap(), 1);
        assert!(std::fs::read_to_string(&reading_csv).unwrap().contains(",reading,0,"));

        let report = app.cleanup(true).await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
