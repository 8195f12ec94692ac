use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;
use crate::services::ContentStore;

pub const DEFAULT_RESULT_LIMIT: usize = 20;
const MIN_TOKEN_CHARS: usize = 3;
const TITLE_WEIGHT: u64 = 10;
const TAG_WEIGHT: u64 = 8;

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"))
}

/// Lowercase word tokens of at least three characters, in text order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub url: String,
    pub title: String,
    pub tags: String,
    pub content_location: Option<String>,
    pub token_frequency: BTreeMap<String, u32>,
    pub content_length: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub score: u64,
    pub url: String,
    pub title: String,
    pub tags: String,
    pub content_location: Option<String>,
}

/// Term-frequency index keyed by article id. Iteration order (ascending id)
/// is the tie-break order for equal scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchIndex {
    entries: BTreeMap<i64, SearchIndexEntry>,
}

impl SearchIndex {
    /// Index every successful article together with its body text.
    pub fn build<I>(articles: I) -> Self
    where
        I: IntoIterator<Item = (Article, String)>,
    {
        let mut entries = BTreeMap::new();
        for (article, content) in articles {
            if !article.success {
                continue;
            }
            let mut token_frequency = BTreeMap::new();
            let text = format!("{} {} {}", article.title, article.tags, content);
            for token in tokenize(&text) {
                *token_frequency.entry(token).or_insert(0) += 1;
            }
            entries.insert(
                article.id,
                SearchIndexEntry {
                    url: article.url,
                    title: article.title,
                    tags: article.tags,
                    content_location: article.content_location,
                    token_frequency,
                    content_length: article.content_length,
                },
            );
        }
        Self { entries }
    }

    /// Rebuild from the store, reading each saved artifact.
    pub async fn build_from_store(repository: &Repository, store: &ContentStore) -> Result<Self> {
        let articles = repository.successful_articles().await?;
        let mut documents = Vec::with_capacity(articles.len());

        for article in articles {
            let content = match article.content_location.as_deref() {
                Some(location) => match store.read(location).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!("Skipping {} from index: {}", location, e);
                        continue;
                    }
                },
                None => String::new(),
            };
            documents.push((article, content));
        }

        let index = Self::build(documents);
        tracing::info!("Indexed {} articles", index.len());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn query(&self, text: &str, limit: usize) -> Vec<SearchHit> {
        let words = tokenize(text);
        if words.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let score = score_entry(entry, &words);
                (score > 0).then(|| SearchHit {
                    id: *id,
                    score,
                    url: entry.url.clone(),
                    title: entry.title.clone(),
                    tags: entry.tags.clone(),
                    content_location: entry.content_location.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(limit);
        hits
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn score_entry(entry: &SearchIndexEntry, words: &[String]) -> u64 {
    let title = entry.title.to_lowercase();
    let tags = entry.tags.to_lowercase();
    let mut score = 0;

    for word in words {
        if title.contains(word.as_str()) {
            score += TITLE_WEIGHT;
        }
        if tags.contains(word.as_str()) {
            score += TAG_WEIGHT;
        }
        if let Some(count) = entry.token_frequency.get(word) {
            score += u64::from(*count);
        }
        score += entry
            .token_frequency
            .keys()
            .filter(|token| *token != word && (token.contains(word.as_str()) || word.contains(token.as_str())))
            .count() as u64;
    }

    score
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn article(id: i64, title: &str, tags: &str) -> Article {
        Article {
            id,
            url: format!("https://example.com/{}", id),
            title: title.to_string(),
            status: "unread".to_string(),
            tags: tags.to_string(),
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
    fn tokenizer_drops_short_tokens() {
        assert_eq!(tokenize("A Go to Rust-lang, OK?"), vec!["rust", "lang"]);
    }

    #[tokio::test]
    async fn title_only_match_scores_exactly_ten() {
        // Saved entry with no body tokens: only the title can match.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search_index.json");
        let json = r#"{
            "1": {
                "url": "https://example.com/zebra",
                "title": "Zebra zebra zebra",
                "tags": "",
                "content_location": null,
                "token_frequency": {},
                "content_length": 0
            }
        }"#;
        std::fs::write(&path, json).unwrap();

        let index = SearchIndex::load(&path).await.unwrap();
        let hits = index.query("zebra", DEFAULT_RESULT_LIMIT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[0].score, 10);
    }

    #[test]
    fn scores_combine_title_tags_frequency_and_partials() {
        let index = SearchIndex::build(vec![(
            article(1, "Rust", "rust|systems"),
            "rust rustacean".to_string(),
        )]);
        // title 10 + tags 8 + tf("rust") 3 + partial "rustacean" 1
        let hits = index.query("rust", DEFAULT_RESULT_LIMIT);
        assert_eq!(hits[0].score, 22);
    }

    #[test]
    fn zero_scores_are_excluded_and_ties_keep_id_order() {
        let index = SearchIndex::build(vec![
            (article(3, "Cooking pasta", ""), String::new()),
            (article(2, "Learning python", ""), String::new()),
            (article(1, "More python", ""), String::new()),
        ]);
        let hits = index.query("python", DEFAULT_RESULT_LIMIT);
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[test]
    fn failed_articles_are_not_indexed() {
        let mut failed = article(1, "Broken", "");
        failed.success = false;
        let index = SearchIndex::build(vec![(failed, String::new())]);
        assert!(index.is_empty());
    }

    #[test]
    fn results_are_truncated_to_limit() {
        let docs = (1..=5).map(|i| (article(i, "shared words", ""), String::new()));
        let index = SearchIndex::build(docs);
        assert_eq!(index.query("shared", 3).len(), 3);
        assert!(index.query("an", 3).is_empty());
    }

    #[tokio::test]
    async fn saved_index_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search_index.json");
        let index = SearchIndex::build(vec![(article(7, "Saved index", "tag"), "body text".to_string())]);

        tokio_test::assert_ok!(index.save(&path).await);
        let loaded = SearchIndex::load(&path).await.unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.entries[&7].token_frequency.get("body"), Some(&1));
    }

    #[tokio::test]
    async fn build_from_store_skips_unreadable_artifacts() {
        use crate::models::NewArticle;

        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let repository = Repository::open_in_memory().await.unwrap();
        let saved = store.save("untagged", "kept", "kept body words").await.unwrap();

        for (url, location) in [
            ("https://example.com/kept", saved.to_string_lossy().to_string()),
            ("https://example.com/lost", dir.path().join("missing.md").to_string_lossy().to_string()),
        ] {
            repository
                .upsert_article(NewArticle {
                    url: url.to_string(),
                    title: "Title".to_string(),
                    status: "unread".to_string(),
                    tags: String::new(),
                    added_at: 0,
                    scraped_at: Utc::now(),
                    content_location: Some(location),
                    content_length: 10,
                    reading_time_estimate: 1,
                    extraction_method: None,
                    archive_url: None,
                    success: true,
                })
                .await
                .unwrap();
        }

        let index = SearchIndex::build_from_store(&repository, &store).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("kept", 5)[0].url, "https://example.com/kept");
    }
}
