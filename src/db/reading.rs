use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{CleanupReport, ReadingEntry, ReadingStats, ReadingStatus, ReadingUpdate};

use super::repository::Repository;

const ENTRY_QUERY: &str = r#"SELECT a.id, a.url, a.title, a.tags, a.reading_time_estimate, a.content_location,
           a.added_at, COALESCE(rp.reading_status, 'unread'), COALESCE(rp.progress_percent, 0),
           rp.rating, rp.notes, rp.time_started, rp.time_completed
    FROM articles a
    LEFT JOIN reading_progress rp ON a.id = rp.article_id
    WHERE a.success = 1"#;

impl Repository {
    /// Record a status change for an article. The first update creates the
    /// progress row; later ones only overwrite the fields they carry.
    /// Moving to `Reading` stamps the start time once, moving to `Completed`
    /// stamps the finish time and fills progress to 100 unless given.
    pub async fn update_reading_status(
        &self,
        article_id: i64,
        update: ReadingUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let now = now.timestamp();
        let progress = update.progress.map(|p| i64::from(p.min(100)));
        let rating = update.rating.map(i64::from);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM reading_progress WHERE article_id = ?1",
                        params![article_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing {
                    Some(id) => {
                        let mut sets = vec!["reading_status = ?"];
                        let mut values = vec![Value::Text(update.status.as_str().to_string())];

                        let progress = match (update.status, progress) {
                            (ReadingStatus::Completed, None) => Some(100),
                            (_, progress) => progress,
                        };
                        if let Some(progress) = progress {
                            sets.push("progress_percent = ?");
                            values.push(Value::Integer(progress));
                        }
                        if let Some(notes) = update.notes {
                            sets.push("notes = ?");
                            values.push(Value::Text(notes));
                        }
                        if let Some(rating) = rating {
                            sets.push("rating = ?");
                            values.push(Value::Integer(rating));
                        }
                        match update.status {
                            ReadingStatus::Reading => {
                                sets.push("time_started = COALESCE(time_started, ?)");
                                values.push(Value::Integer(now));
                            }
                            ReadingStatus::Completed => {
                                sets.push("time_completed = ?");
                                values.push(Value::Integer(now));
                            }
                            ReadingStatus::Unread => {}
                        }
                        values.push(Value::Integer(id));

                        let sql = format!("UPDATE reading_progress SET {} WHERE id = ?", sets.join(", "));
                        tx.execute(&sql, params_from_iter(values))?;
                    }
                    None => {
                        let (started, completed, progress) = match update.status {
                            ReadingStatus::Unread => (None, None, progress.unwrap_or(0)),
                            ReadingStatus::Reading => (Some(now), None, progress.unwrap_or(0)),
                            ReadingStatus::Completed => (None, Some(now), progress.unwrap_or(100)),
                        };
                        tx.execute(
                            r#"INSERT INTO reading_progress (article_id, reading_status, progress_percent,
                                                             time_started, time_completed, notes, rating)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                            params![
                                article_id,
                                update.status.as_str(),
                                progress,
                                started,
                                completed,
                                update.notes,
                                rating,
                            ],
                        )?;
                    }
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn start_session(&self, article_id: i64, now: DateTime<Utc>) -> Result<i64> {
        let started = now.timestamp();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO reading_sessions (article_id, session_start) VALUES (?1, ?2)",
                    params![article_id, started],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Close a session and return its length in whole minutes, or `None`
    /// when no such session exists.
    pub async fn end_session(
        &self,
        session_id: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let ended = now.timestamp();
        let minutes = self
            .conn
            .call(move |conn| {
                let start: Option<i64> = conn
                    .query_row(
                        "SELECT session_start FROM reading_sessions WHERE id = ?1",
                        params![session_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(start) = start else {
                    return Ok(None);
                };

                let minutes = (ended - start).max(0) / 60;
                conn.execute(
                    r#"UPDATE reading_sessions
                       SET session_end = ?1, duration_minutes = ?2, notes = COALESCE(?3, notes)
                       WHERE id = ?4"#,
                    params![ended, minutes, notes, session_id],
                )?;
                Ok(Some(minutes))
            })
            .await?;
        Ok(minutes)
    }

    /// Successful articles with their reading state, newest bookmark first.
    /// `tag` matches anywhere in the tag list.
    pub async fn reading_list(
        &self,
        status: Option<ReadingStatus>,
        tag: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<ReadingEntry>> {
        let mut sql = ENTRY_QUERY.to_string();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = status {
            sql.push_str(" AND COALESCE(rp.reading_status, 'unread') = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(tag) = tag.filter(|t| !t.trim().is_empty()) {
            sql.push_str(" AND a.tags LIKE ?");
            values.push(Value::Text(format!("%{}%", tag.trim())));
        }
        sql.push_str(" ORDER BY a.added_at DESC, a.id");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params_from_iter(values), entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn reading_stats(&self) -> Result<ReadingStats> {
        let stats = self
            .conn
            .call(|conn| {
                let total_articles: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE success = 1",
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    r#"SELECT COALESCE(rp.reading_status, 'unread'), COUNT(*)
                       FROM articles a
                       LEFT JOIN reading_progress rp ON a.id = rp.article_id
                       WHERE a.success = 1
                       GROUP BY COALESCE(rp.reading_status, 'unread')"#,
                )?;
                let counted = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let by_status = [ReadingStatus::Unread, ReadingStatus::Reading, ReadingStatus::Completed]
                    .into_iter()
                    .map(|status| {
                        let count = counted
                            .iter()
                            .find(|(name, _)| name == status.as_str())
                            .map_or(0, |(_, n)| *n);
                        (status, count)
                    })
                    .collect();

                let total_reading_minutes: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(duration_minutes), 0) FROM reading_sessions",
                    [],
                    |row| row.get(0),
                )?;
                let average_rating: Option<f64> = conn.query_row(
                    "SELECT AVG(rating) FROM reading_progress WHERE rating IS NOT NULL",
                    [],
                    |row| row.get(0),
                )?;

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

                Ok(ReadingStats {
                    total_articles,
                    by_status,
                    total_reading_minutes,
                    average_rating: average_rating.map(|r| (r * 10.0).round() / 10.0),
                    top_tags,
                })
            })
            .await?;
        Ok(stats)
    }

    /// Drop reading rows whose article is gone and, when asked, every
    /// failed article row.
    pub async fn cleanup(&self, remove_failed: bool) -> Result<CleanupReport> {
        let report = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let failed_articles = if remove_failed {
                    tx.execute("DELETE FROM articles WHERE success = 0", [])?
                } else {
                    0
                };
                let orphaned_progress = tx.execute(
                    "DELETE FROM reading_progress WHERE article_id NOT IN (SELECT id FROM articles)",
                    [],
                )?;
                let orphaned_sessions = tx.execute(
                    "DELETE FROM reading_sessions WHERE article_id NOT IN (SELECT id FROM articles)",
                    [],
                )?;
                tx.commit()?;

                Ok(CleanupReport {
                    failed_articles,
                    orphaned_progress,
                    orphaned_sessions,
                })
            })
            .await?;
        Ok(report)
    }
}

fn entry_from_row(row: &Row) -> rusqlite::Result<ReadingEntry> {
    Ok(ReadingEntry {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        tags: row.get(3)?,
        reading_time_estimate: row.get(4)?,
        content_location: row.get(5)?,
        added_at: row.get(6)?,
        status: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or_default(),
        progress_percent: row.get(8)?,
        rating: row.get(9)?,
        notes: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}
