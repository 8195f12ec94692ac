use std::io::ErrorKind;
use std::sync::Arc;

use chrono::Utc;

use crate::db::Repository;
use crate::error::{AppError, FetchError};
use crate::extract::Extracted;
use crate::models::{NewArticle, SourceRecord};
use crate::urls::normalize_url;

use super::content_store::{
    bucket_for, file_stem, render_artifact, ContentStore, SnapshotSource, ARCHIVE_BUCKET,
};

/// Persists a rescued article: the content artifact first, then the
/// keyed store row pointing at it.
pub struct ArticleWriter {
    repository: Arc<Repository>,
    store: ContentStore,
}

impl ArticleWriter {
    pub fn new(repository: Arc<Repository>, store: ContentStore) -> Self {
        Self { repository, store }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Save the artifact and upsert its row. When the row already pointed
    /// at a different artifact (new title or tag), that file is removed
    /// after the row is updated so one key never owns two files.
    pub async fn write(
        &self,
        record: &SourceRecord,
        extracted: &Extracted,
        snapshot: Option<&SnapshotSource>,
    ) -> Result<i64, FetchError> {
        let key = normalize_url(&record.url)?;
        let previous = self.repository.get_article_by_url(&key).await?;

        let (bucket, fallback_stem) = match snapshot {
            Some(_) => (ARCHIVE_BUCKET.to_string(), "archived_page"),
            None => (bucket_for(record), "untitled"),
        };
        let stem = file_stem(&extracted.title, &key, fallback_stem);
        let document = render_artifact(&extracted.title, record, snapshot, &extracted.text);
        let path = self.store.save(&bucket, &stem, &document).await?;
        let location = path.to_string_lossy().to_string();

        let article = NewArticle {
            url: key,
            title: extracted.title.clone(),
            status: record.status.clone(),
            tags: record.tags.clone(),
            added_at: record.added_at,
            scraped_at: Utc::now(),
            content_location: Some(location.clone()),
            content_length: extracted.text.chars().count() as i64,
            reading_time_estimate: NewArticle::reading_time_for(&extracted.text),
            extraction_method: Some(extracted.method),
            archive_url: snapshot.map(|s| s.archive_url.clone()),
            success: true,
        };
        let id = self.repository.upsert_article(article).await?;

        if let Some(stale) = previous.and_then(|a| a.content_location) {
            if stale != location {
                self.discard(&stale).await;
            }
        }

        Ok(id)
    }

    async fn discard(&self, location: &str) {
        match self.store.remove(location).await {
            Ok(()) => tracing::debug!("Replaced artifact {}", location),
            Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not delete replaced artifact {}: {}", location, e),
        }
    }
}
