use anyhow::{anyhow, Result};
use rusqlite::{params, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::VideoProgress,
};

const VIDEO_PROGRESS_COLUMNS: &str = "id, user_id, user_email, video_id, video_url, progress,
     position_seconds, duration_seconds, stream_selected, task_status, event_name,
     last_event_at, updated_at, created_at";

fn row_to_video_progress(row: &Row) -> Result<VideoProgress> {
    let last_event_at: String = row.get("last_event_at")?;
    let updated_at: String = row.get("updated_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(VideoProgress {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        user_email: row.get("user_email")?,
        video_id: row.get("video_id")?,
        video_url: row.get("video_url")?,
        progress: row.get("progress")?,
        position_seconds: row.get("position_seconds")?,
        duration_seconds: row.get("duration_seconds")?,
        stream_selected: row.get("stream_selected")?,
        task_status: row.get("task_status")?,
        event_name: row.get("event_name")?,
        last_event_at: parse_datetime(&last_event_at, "last_event_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

/// Optional exact-match filters for listing progress rows.
#[derive(Debug, Clone, Default)]
pub struct VideoProgressFilter {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub video_id: Option<String>,
}

impl Database {
    /// Inserts or replaces the progress row for `(user_id, video_id)`. An
    /// existing row keeps its `id` and `created_at`.
    pub async fn upsert_video_progress(&self, record: VideoProgress) -> Result<VideoProgress> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO video_progress (
                    id,
                    user_id,
                    user_email,
                    video_id,
                    video_url,
                    progress,
                    position_seconds,
                    duration_seconds,
                    stream_selected,
                    task_status,
                    event_name,
                    last_event_at,
                    updated_at,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(user_id, video_id) DO UPDATE SET
                    user_email = excluded.user_email,
                    video_url = excluded.video_url,
                    progress = excluded.progress,
                    position_seconds = excluded.position_seconds,
                    duration_seconds = excluded.duration_seconds,
                    stream_selected = excluded.stream_selected,
                    task_status = excluded.task_status,
                    event_name = excluded.event_name,
                    last_event_at = excluded.last_event_at,
                    updated_at = excluded.updated_at",
                params![
                    record.id,
                    record.user_id,
                    record.user_email,
                    record.video_id,
                    record.video_url,
                    record.progress,
                    record.position_seconds,
                    record.duration_seconds,
                    record.stream_selected,
                    record.task_status,
                    record.event_name,
                    format_datetime(&record.last_event_at),
                    format_datetime(&record.updated_at),
                    format_datetime(&record.created_at),
                ],
            )?;

            let stored = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {VIDEO_PROGRESS_COLUMNS} FROM video_progress
                     WHERE user_id = ?1 AND video_id = ?2"
                ))?;
                let mut rows = stmt.query(params![record.user_id, record.video_id])?;
                match rows.next()? {
                    Some(row) => row_to_video_progress(row)?,
                    None => return Err(anyhow!("video progress not found after upsert")),
                }
            };

            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    /// Newest rows first, at most `limit`.
    pub async fn list_video_progress(
        &self,
        filter: VideoProgressFilter,
        limit: i64,
    ) -> Result<Vec<VideoProgress>> {
        self.execute(move |conn| {
            // Build the WHERE clause from whichever filters are present
            let mut clauses = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(user_id) = filter.user_id {
                clauses.push("user_id = ?");
                params_vec.push(Box::new(user_id));
            }
            if let Some(user_email) = filter.user_email {
                clauses.push("user_email = ?");
                params_vec.push(Box::new(user_email));
            }
            if let Some(video_id) = filter.video_id {
                clauses.push("video_id = ?");
                params_vec.push(Box::new(video_id));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            params_vec.push(Box::new(limit));

            let query = format!(
                "SELECT {VIDEO_PROGRESS_COLUMNS} FROM video_progress
                 {where_clause}
                 ORDER BY updated_at DESC
                 LIMIT ?"
            );

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params_refs.as_slice())?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_video_progress(row)?);
            }

            Ok(records)
        })
        .await
    }
}
