//! Ordered fallback chain of content-extraction strategies.
//!
//! A page is downloaded once and every configured strategy is tried against
//! it in order. The first strategy whose trimmed text reaches the
//! acceptance threshold wins.

mod strategies;

use std::sync::Arc;

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::error::FetchError;
use crate::models::ExtractionMethod;
use crate::services::PageFetcher;

pub(crate) use strategies::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Structured article metadata (JSON-LD `articleBody`) or `<article>` paragraphs.
    Article,
    /// Densest paragraph container after dropping boilerplate blocks.
    Readability,
    /// First match from a list of common content selectors.
    Selector,
    /// Whole page rendered to text.
    FullPage,
}

impl StrategyKind {
    pub fn default_order() -> Vec<StrategyKind> {
        vec![
            StrategyKind::Article,
            StrategyKind::Readability,
            StrategyKind::Selector,
            StrategyKind::FullPage,
        ]
    }

    pub fn method(self) -> ExtractionMethod {
        match self {
            StrategyKind::Article => ExtractionMethod::Article,
            StrategyKind::Readability => ExtractionMethod::Readability,
            StrategyKind::Selector => ExtractionMethod::Selector,
            StrategyKind::FullPage => ExtractionMethod::FullPage,
        }
    }

    fn apply(self, document: &Html, html: &str) -> Option<Candidate> {
        match self {
            StrategyKind::Article => strategies::structured_article(document),
            StrategyKind::Readability => strategies::readability(document),
            StrategyKind::Selector => strategies::content_selectors(document),
            StrategyKind::FullPage => strategies::full_page(document, html),
        }
    }
}

/// Accepted extraction result.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub title: String,
    pub method: ExtractionMethod,
}

/// Strategy order and acceptance threshold. Parsing and scoring are CPU
/// bound, so the chain runs this on the blocking pool.
struct Extractor {
    strategies: Vec<StrategyKind>,
    min_content_chars: usize,
}

impl Extractor {
    fn run(&self, html: &str, fallback_title: &str) -> Result<Extracted, FetchError> {
        let document = Html::parse_document(html);

        for kind in &self.strategies {
            let Some(candidate) = kind.apply(&document, html) else {
                tracing::debug!("Strategy {:?} found nothing", kind);
                continue;
            };

            if !self.accepts(&candidate.text) {
                tracing::debug!(
                    "Strategy {:?} under threshold ({} chars)",
                    kind,
                    candidate.text.trim().chars().count()
                );
                continue;
            }

            let title = if candidate.title.trim().is_empty() {
                fallback_title.to_string()
            } else {
                candidate.title.trim().to_string()
            };

            return Ok(Extracted {
                text: candidate.text.trim().to_string(),
                title,
                method: kind.method(),
            });
        }

        Err(FetchError::NoContentExtracted)
    }

    fn accepts(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.min_content_chars
    }
}

pub struct ExtractionChain {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<Extractor>,
}

impl ExtractionChain {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ExtractionConfig) -> Self {
        let strategies = if config.strategies.is_empty() {
            StrategyKind::default_order()
        } else {
            config.strategies.clone()
        };
        Self {
            fetcher,
            extractor: Arc::new(Extractor {
                strategies,
                min_content_chars: config.min_content_chars,
            }),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Download `url` and run the strategy chain over it. An empty
    /// extracted title falls back to `fallback_title`.
    pub async fn extract(&self, url: &str, fallback_title: &str) -> Result<Extracted, FetchError> {
        let html = self.fetcher.fetch_page(url).await?;
        self.extract_html(html, fallback_title).await
    }

    /// Run the strategy chain over an already downloaded page on the
    /// blocking pool, leaving the runtime's workers free for I/O.
    pub async fn extract_html(&self, html: String, fallback_title: &str) -> Result<Extracted, FetchError> {
        let extractor = Arc::clone(&self.extractor);
        let fallback_title = fallback_title.to_string();

        match tokio::task::spawn_blocking(move || extractor.run(&html, &fallback_title)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Extraction task failed: {}", e);
                Err(FetchError::NoContentExtracted)
            }
        }
    }
}
