use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Article, SourceRecord};

const SECONDS_PER_DAY: f64 = 86_400.0;
const RECENCY_WINDOW_DAYS: f64 = 30.0;
const RECENCY_MAX_BONUS: f64 = 10.0;

/// One row of a rule table: a lowercase substring and the points it earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPattern {
    pub pattern: String,
    pub weight: f64,
}

impl WeightedPattern {
    fn new(pattern: &str, weight: f64) -> Self {
        Self {
            pattern: pattern.to_string(),
            weight,
        }
    }
}

fn table(rows: &[(&str, f64)]) -> Vec<WeightedPattern> {
    rows.iter().map(|(p, w)| WeightedPattern::new(p, *w)).collect()
}

/// Declarative scoring policy. Every table is an ordered list; for
/// `time_categories` only the first matching row counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRules {
    #[serde(default = "default_reading_tags")]
    pub reading_tags: Vec<WeightedPattern>,

    #[serde(default = "default_time_categories")]
    pub time_categories: Vec<WeightedPattern>,

    #[serde(default = "default_topics")]
    pub topics: Vec<WeightedPattern>,

    /// Matched exactly against the status; unlisted statuses multiply by 1.0.
    #[serde(default = "default_status_multipliers")]
    pub status_multipliers: Vec<WeightedPattern>,
}

fn default_reading_tags() -> Vec<WeightedPattern> {
    table(&[
        ("_reading", 50.0),
        ("_practice", 40.0),
        ("education", 30.0),
        ("learning", 25.0),
    ])
}

fn default_time_categories() -> Vec<WeightedPattern> {
    table(&[
        ("1 minute or less", 15.0),
        ("2 minutes or less", 15.0),
        ("5 minutes or less", 10.0),
        ("10 minutes or less", 8.0),
        ("15 minutes or less", 6.0),
        ("30 minutes or less", 4.0),
        ("30+ minutes", 2.0),
    ])
}

fn default_topics() -> Vec<WeightedPattern> {
    table(&[
        ("programming", 20.0),
        ("coding", 20.0),
        ("codding", 20.0),
        ("development", 15.0),
        ("tech", 15.0),
        ("productivity", 10.0),
        ("security", 12.0),
        ("gamedev", 8.0),
        ("python", 18.0),
        ("javascript", 15.0),
        ("career", 12.0),
    ])
}

fn default_status_multipliers() -> Vec<WeightedPattern> {
    table(&[("unread", 1.0), ("archive", 0.1)])
}

impl Default for PriorityRules {
    fn default() -> Self {
        Self {
            reading_tags: default_reading_tags(),
            time_categories: default_time_categories(),
            topics: default_topics(),
            status_multipliers: default_status_multipliers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityCategory {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl PriorityCategory {
    pub const ALL: [PriorityCategory; 5] = [
        PriorityCategory::Critical,
        PriorityCategory::High,
        PriorityCategory::Medium,
        PriorityCategory::Low,
        PriorityCategory::Minimal,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 50.0 {
            PriorityCategory::Critical
        } else if score >= 25.0 {
            PriorityCategory::High
        } else if score >= 10.0 {
            PriorityCategory::Medium
        } else if score >= 5.0 {
            PriorityCategory::Low
        } else {
            PriorityCategory::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityCategory::Critical => "critical",
            PriorityCategory::High => "high",
            PriorityCategory::Medium => "medium",
            PriorityCategory::Low => "low",
            PriorityCategory::Minimal => "minimal",
        }
    }
}

impl fmt::Display for PriorityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityScore {
    pub score: f64,
    pub category: PriorityCategory,
}

/// Anything carrying the fields the scorer reads.
pub trait Prioritized {
    fn tags(&self) -> &str;
    fn status(&self) -> &str;
    fn added_at(&self) -> i64;
}

impl Prioritized for SourceRecord {
    fn tags(&self) -> &str {
        &self.tags
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn added_at(&self) -> i64 {
        self.added_at
    }
}

impl Prioritized for Article {
    fn tags(&self) -> &str {
        &self.tags
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn added_at(&self) -> i64 {
        self.added_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrioritizedArticle {
    pub url: String,
    pub title: String,
    pub tags: String,
    pub status: String,
    pub added_at: i64,
    pub priority: PriorityScore,
}

pub struct PriorityScorer {
    rules: PriorityRules,
}

impl PriorityScorer {
    pub fn new(rules: PriorityRules) -> Self {
        Self { rules }
    }

    pub fn score<T: Prioritized>(&self, item: &T) -> PriorityScore {
        self.score_at(item, Utc::now())
    }

    /// Pure scoring against a fixed clock.
    pub fn score_at<T: Prioritized>(&self, item: &T, now: DateTime<Utc>) -> PriorityScore {
        let tags = item.tags().to_lowercase();
        let mut score = 1.0;

        score += sum_matches(&self.rules.reading_tags, &tags);
        score += self
            .rules
            .time_categories
            .iter()
            .find(|row| tags.contains(&row.pattern))
            .map_or(0.0, |row| row.weight);
        score += sum_matches(&self.rules.topics, &tags);

        let status = item.status().trim().to_lowercase();
        score *= self
            .rules
            .status_multipliers
            .iter()
            .find(|row| row.pattern == status)
            .map_or(1.0, |row| row.weight);

        let added_at = item.added_at();
        if added_at > 0 {
            let age_days = (now.timestamp() - added_at) as f64 / SECONDS_PER_DAY;
            if age_days < RECENCY_WINDOW_DAYS {
                score += (RECENCY_MAX_BONUS - age_days / 3.0).max(0.0);
            }
        }

        let score = (score * 100.0).round() / 100.0;
        PriorityScore {
            score,
            category: PriorityCategory::from_score(score),
        }
    }

    /// Score every record and order by descending score. Ties keep input order.
    pub fn analyze(&self, records: &[SourceRecord], now: DateTime<Utc>) -> Vec<PrioritizedArticle> {
        let mut scored: Vec<PrioritizedArticle> = records
            .iter()
            .map(|record| PrioritizedArticle {
                url: record.url.clone(),
                title: record.title.clone(),
                tags: record.tags.clone(),
                status: record.status.clone(),
                added_at: record.added_at,
                priority: self.score_at(record, now),
            })
            .collect();

        scored.sort_by(|a, b| b.priority.score.total_cmp(&a.priority.score));
        scored
    }
}

fn sum_matches(rows: &[WeightedPattern], tags: &str) -> f64 {
    rows.iter()
        .filter(|row| tags.contains(&row.pattern))
        .map(|row| row.weight)
        .sum()
}

/// Article count per category, highest category first, empty ones omitted.
pub fn category_counts(articles: &[PrioritizedArticle]) -> Vec<(PriorityCategory, usize)> {
    PriorityCategory::ALL
        .iter()
        .map(|c| {
            let n = articles.iter().filter(|a| a.priority.category == *c).count();
            (*c, n)
        })
        .filter(|(_, n)| *n > 0)
        .collect()
}
