use anyhow::Result;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, to_i64, to_u64},
    models::{PageSession, PageSessionFinalization, PageSessionStatus, SessionRejection},
};

const PAGE_SESSION_COLUMNS: &str = "id, user_id, user_session_id, page, created_at, ended_at,
     duration_seconds, event_count, click_count, last_event_at, score";

fn row_to_page_session(row: &Row) -> Result<PageSession> {
    let created_at: String = row.get("created_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let last_event_at: Option<String> = row.get("last_event_at")?;
    let event_count: i64 = row.get("event_count")?;
    let click_count: i64 = row.get("click_count")?;

    Ok(PageSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        user_session_id: row.get("user_session_id")?,
        page: row.get("page")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        duration_seconds: row.get("duration_seconds")?,
        event_count: to_u64(event_count, "event_count")?,
        click_count: to_u64(click_count, "click_count")?,
        last_event_at: parse_optional_datetime(last_event_at, "last_event_at")?,
        score: row.get("score")?,
    })
}

/// Loads a page session through an existing connection or transaction, so
/// writers can check it inside their own transaction.
pub(super) fn fetch_page_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<PageSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAGE_SESSION_COLUMNS} FROM page_sessions WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![session_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_page_session(row)?)),
        None => Ok(None),
    }
}

/// Rejects writes against missing or ended sessions.
pub(super) fn require_open_session(
    conn: &Connection,
    session_id: &str,
) -> Result<std::result::Result<PageSession, SessionRejection>> {
    Ok(match fetch_page_session(conn, session_id)? {
        None => Err(SessionRejection::Missing),
        Some(session) if session.status() == PageSessionStatus::Ended => {
            Err(SessionRejection::Ended)
        }
        Some(session) => Ok(session),
    })
}

impl Database {
    pub async fn insert_page_session(&self, session: &PageSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO page_sessions (id, user_id, user_session_id, page, created_at, event_count, click_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.user_session_id,
                    record.page,
                    format_datetime(&record.created_at),
                    to_i64(record.event_count)?,
                    to_i64(record.click_count)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_page_session(&self, session_id: &str) -> Result<Option<PageSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| fetch_page_session(conn, &session_id)).await
    }

    /// Writes the end-of-session fields in one update, only while the session
    /// is still open.
    pub async fn finalize_page_session(
        &self,
        finalization: PageSessionFinalization,
    ) -> Result<std::result::Result<(), SessionRejection>> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE page_sessions
                 SET ended_at = ?1,
                     duration_seconds = ?2,
                     score = ?3,
                     last_event_at = ?4
                 WHERE id = ?5 AND ended_at IS NULL",
                params![
                    format_datetime(&finalization.ended_at),
                    finalization.duration_seconds,
                    finalization.score,
                    format_datetime(&finalization.last_event_at),
                    finalization.session_id,
                ],
            )?;

            if rows_affected == 1 {
                return Ok(Ok(()));
            }

            match fetch_page_session(conn, &finalization.session_id)? {
                Some(_) => Ok(Err(SessionRejection::Ended)),
                None => Ok(Err(SessionRejection::Missing)),
            }
        })
        .await
    }
}
