use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::Serialize;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, ArticleQuery, NewArticle};
use crate::urls::normalize_url;

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "id, url, title, status, tags, added_at, scraped_at, content_location, \
     content_length, reading_time_estimate, extraction_method, archive_url, success";

/// Keyed article store. Every call runs as one closure on the connection
/// thread, so writes are atomic and the last committed write wins.
pub struct Repository {
    pub(super) conn: Connection,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_articles: i64,
    pub failed_articles: i64,
    pub total_content_length: i64,
    pub avg_content_length: i64,
    pub by_method: Vec<(String, i64)>,
    pub top_tags: Vec<(String, i64)>,
}

impl Repository {
    pub async fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert or replace every mutable field of the article keyed by its
    /// normalized URL. The surrogate id survives re-processing.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<i64> {
        let key = storage_key(&article.url);
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"INSERT INTO articles (url, title, status, tags, added_at, scraped_at,
                                             content_location, content_length, reading_time_estimate,
                                             extraction_method, archive_url, success)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                       ON CONFLICT(url) DO UPDATE SET
                           title = excluded.title,
                           status = excluded.status,
                           tags = excluded.tags,
                           added_at = excluded.added_at,
                           scraped_at = excluded.scraped_at,
                           content_location = excluded.content_location,
                           content_length = excluded.content_length,
                           reading_time_estimate = excluded.reading_time_estimate,
                           extraction_method = excluded.extraction_method,
                           archive_url = excluded.archive_url,
                           success = excluded.success
                       RETURNING id"#,
                    params![
                        key,
                        article.title,
                        article.status,
                        article.tags,
                        article.added_at,
                        article.scraped_at.to_rfc3339(),
                        article.content_location,
                        article.content_length,
                        article.reading_time_estimate,
                        article.extraction_method.map(|m| m.as_str()),
                        article.archive_url,
                        article.success,
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        let key = storage_key(url);
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE url = ?1",
                    ARTICLE_COLUMNS
                ))?;
                let article = stmt
                    .query_row(params![key], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE id = ?1",
                    ARTICLE_COLUMNS
                ))?;
                let article = stmt.query_row(params![id], article_from_row).optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Articles matching every set criterion, in insertion (id) order.
    pub async fn query_articles(&self, query: ArticleQuery) -> Result<Vec<Article>> {
        let mut sql = format!("SELECT {} FROM articles WHERE 1 = 1", ARTICLE_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(status));
        }
        if let Some(success) = query.success {
            sql.push_str(" AND success = ?");
            values.push(Value::Integer(success as i64));
        }
        sql.push_str(" ORDER BY id");
        match (query.limit, query.offset) {
            (Some(limit), _) => {
                sql.push_str(" LIMIT ?");
                values.push(Value::Integer(limit as i64));
            }
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = query.offset {
            sql.push_str(" OFFSET ?");
            values.push(Value::Integer(offset as i64));
        }

        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params_from_iter(values), article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn successful_articles(&self) -> Result<Vec<Article>> {
        self.query_articles(ArticleQuery {
            success: Some(true),
            ..ArticleQuery::default()
        })
        .await
    }

    /// Returns whether a row was removed. Reading progress and sessions for
    /// the article go with it.
    pub async fn delete_article(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM reading_progress WHERE article_id = ?1", params![id])?;
                tx.execute("DELETE FROM reading_sessions WHERE article_id = ?1", params![id])?;
                let n = tx.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let stats = self
            .conn
            .call(|conn| {
                let (total_articles, total_content_length): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(content_length), 0) FROM articles WHERE success = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                let failed_articles: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE success = 0",
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    r#"SELECT COALESCE(extraction_method, 'none'), COUNT(*)
                       FROM articles WHERE success = 1
                       GROUP BY extraction_method
                       ORDER BY COUNT(*) DESC, extraction_method"#,
                )?;
                let by_method = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<(String, i64)>, _>>()?;

                let mut stmt = conn.prepare(
                    r#"SELECT tags, COUNT(*) FROM articles
                       WHERE success = 1 AND tags != ''
                       GROUP BY tags
                       ORDER BY COUNT(*) DESC, tags
                       LIMIT 10"#,
                )?;
                let top_tags = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<(String, i64)>, _>>()?;

                let avg_content_length = if total_articles > 0 {
                    total_content_length / total_articles
                } else {
                    0
                };

                Ok(StoreStats {
                    total_articles,
                    failed_articles,
                    total_content_length,
                    avg_content_length,
                    by_method,
                    top_tags,
                })
            })
            .await?;
        Ok(stats)
    }
}

fn storage_key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        tags: row.get(4)?,
        added_at: row.get(5)?,
        scraped_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        content_location: row.get(7)?,
        content_length: row.get(8)?,
        reading_time_estimate: row.get(9)?,
        extraction_method: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| s.parse().ok()),
        archive_url: row.get(11)?,
        success: row.get::<_, i64>(12)? != 0,
    })
}
