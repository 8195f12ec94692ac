use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Article;
use crate::services::ContentStore;

const DUPLICATE_THRESHOLD: f64 = 0.8;

fn punctuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"))
}

/// Lowercased title words with punctuation removed.
pub fn title_tokens(title: &str) -> HashSet<String> {
    punctuation_regex()
        .replace_all(&title.to_lowercase(), "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// |a ∩ b| / |a ∪ b|, or 0 when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub url: String,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            url: article.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidate {
    pub first: ArticleSummary,
    pub second: ArticleSummary,
    pub similarity: f64,
}

impl DuplicateCandidate {
    fn loser(&self, keep_first: bool) -> &ArticleSummary {
        if keep_first {
            &self.second
        } else {
            &self.first
        }
    }
}

/// All-pairs title comparison over successful articles, in input order.
pub fn find_duplicates(articles: &[Article]) -> Vec<DuplicateCandidate> {
    let tokenized: Vec<(&Article, HashSet<String>)> = articles
        .iter()
        .filter(|a| a.success)
        .map(|a| (a, title_tokens(&a.title)))
        .collect();

    let mut candidates = Vec::new();
    for (i, (first, first_tokens)) in tokenized.iter().enumerate() {
        if first_tokens.is_empty() {
            continue;
        }
        for (second, second_tokens) in &tokenized[i + 1..] {
            if second_tokens.is_empty() {
                continue;
            }
            let similarity = jaccard(first_tokens, second_tokens);
            if similarity > DUPLICATE_THRESHOLD {
                candidates.push(DuplicateCandidate {
                    first: ArticleSummary::from(*first),
                    second: ArticleSummary::from(*second),
                    similarity,
                });
            }
        }
    }

    candidates
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub removed: Vec<i64>,
    /// Artifacts whose deletion failed; their store rows are gone regardless.
    pub orphaned_files: Vec<String>,
}

/// Remove the losing side of every candidate. Content deletion is best
/// effort; the store row is removed even when the file cannot be.
pub async fn resolve(
    repository: &Repository,
    store: &ContentStore,
    candidates: &[DuplicateCandidate],
    keep_first: bool,
) -> Result<ResolutionReport> {
    let mut report = ResolutionReport::default();

    for candidate in candidates {
        let loser = candidate.loser(keep_first);
        let Some(article) = repository.get_article(loser.id).await? else {
            tracing::debug!("Duplicate {} already removed", loser.id);
            continue;
        };

        if let Some(location) = article.content_location.as_deref() {
            match store.remove(location).await {
                Ok(()) => {}
                Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Could not delete {}: {}", location, e);
                    report.orphaned_files.push(location.to_string());
                }
            }
        }

        if repository.delete_article(article.id).await? {
            tracing::info!("Removed duplicate: {}", article.title);
            report.removed.push(article.id);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::NewArticle;

    fn article(id: i64, title: &str) -> Article {
        Article {
            id,
            url: format!("https://example.com/{}", id),
            title: title.to_string(),
            status: "unread".to_string(),
            tags: String::new(),
            added_at: 0,
            scraped_at: Utc::now(),
            content_location: None,
            content_length: 0,
            reading_time_estimate: 1,
            extraction_method: None,
            archive_url: None,
            success: true,
        }
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        let a = title_tokens("Python Tutorial for Beginners");
        let b = title_tokens("Python Tutorial for beginners!");
        assert_eq!(jaccard(&a, &b), 1.0);

        let found = find_duplicates(&[
            article(1, "Python Tutorial for Beginners"),
            article(2, "Python Tutorial for beginners!"),
        ]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first.id, 1);
        assert_eq!(found[0].second.id, 2);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let a = title_tokens("rust async runtime internals");
        let b = title_tokens("async rust book");
        let ab = jaccard(&a, &b);
        assert_eq!(ab, jaccard(&b, &a));
        assert!((0.0..=1.0).contains(&ab));
        assert_eq!(jaccard(&title_tokens("cats"), &title_tokens("dogs")), 0.0);
    }

    #[test]
    fn threshold_is_strict_and_empty_titles_are_skipped() {
        // 4 shared of 5 total words: exactly 0.8, not flagged.
        let found = find_duplicates(&[
            article(1, "one two three four"),
            article(2, "one two three four five"),
            article(3, "!!!"),
            article(4, "???"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn failed_articles_are_ignored() {
        let mut failed = article(2, "Same Title");
        failed.success = false;
        assert!(find_duplicates(&[article(1, "Same Title"), failed]).is_empty());
    }

    async fn stored(repository: &Repository, url: &str, location: Option<String>) -> i64 {
        repository
            .upsert_article(NewArticle {
                url: url.to_string(),
                title: "Same Title".to_string(),
                status: "unread".to_string(),
                tags: String::new(),
                added_at: 0,
                scraped_at: Utc::now(),
                content_location: location,
                content_length: 10,
                reading_time_estimate: 1,
                extraction_method: None,
                archive_url: None,
                success: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resolve_removes_loser_and_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let repository = Repository::open_in_memory().await.unwrap();

        let first_path = store.save("untagged", "first", "a").await.unwrap();
        let second_path = store.save("untagged", "second", "b").await.unwrap();
        stored(&repository, "https://example.com/a", Some(first_path.to_string_lossy().to_string())).await;
        stored(&repository, "https://example.com/b", Some(second_path.to_string_lossy().to_string())).await;

        let articles = repository.successful_articles().await.unwrap();
        let candidates = find_duplicates(&articles);
        assert_eq!(candidates.len(), 1);

        let report = resolve(&repository, &store, &candidates, true).await.unwrap();
        assert_eq!(report.removed, vec![candidates[0].second.id]);
        assert!(report.orphaned_files.is_empty());
        assert!(first_path.exists());
        assert!(!second_path.exists());

        // Resolving again is a no-op.
        let again = resolve(&repository, &store, &candidates, true).await.unwrap();
        assert!(again.removed.is_empty());
    }

    #[tokio::test]
    async fn undeletable_file_is_reported_but_row_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let repository = Repository::open_in_memory().await.unwrap();

        // A directory cannot be removed with remove_file.
        let blocker = dir.path().join("blocker");
        std::fs::create_dir(&blocker).unwrap();
        let blocker = blocker.to_string_lossy().to_string();

        let first = stored(&repository, "https://example.com/a", Some(blocker.clone())).await;
        stored(&repository, "https://example.com/b", None).await;

        let articles = repository.successful_articles().await.unwrap();
        let candidates = find_duplicates(&articles);
        let report = resolve(&repository, &store, &candidates, false).await.unwrap();

        assert_eq!(report.removed, vec![first]);
        assert_eq!(report.orphaned_files, vec![blocker]);
        assert!(repository.get_article(first).await.unwrap().is_none());
    }
}
