use anyhow::Result;
use rusqlite::{params, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{decode_json, encode_json, format_datetime, parse_datetime, to_i64},
    models::{Event, EventCounterDelta, NewEvent, SessionRejection},
};

use super::page_sessions::require_open_session;

fn row_to_event(row: &Row) -> Result<Event> {
    let event_timestamp: String = row.get("event_timestamp")?;
    let data: Option<String> = row.get("data")?;

    Ok(Event {
        id: row.get("id")?,
        page_session_id: row.get("page_session_id")?,
        event_type: row.get("event_type")?,
        event_timestamp: parse_datetime(&event_timestamp, "event_timestamp")?,
        x: row.get("x")?,
        y: row.get("y")?,
        data: decode_json(data),
    })
}

impl Database {
    /// Inserts a batch of events and bumps the owning session's counters in
    /// the same transaction. Counters are applied as SQL increments and
    /// `last_event_at` only ever moves forward.
    pub async fn append_events(
        &self,
        session_id: &str,
        events: Vec<NewEvent>,
        delta: EventCounterDelta,
    ) -> Result<std::result::Result<usize, SessionRejection>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Err(rejection) = require_open_session(&tx, &session_id)? {
                return Ok(Err(rejection));
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO events (page_session_id, event_type, event_timestamp, x, y, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for event in &events {
                    stmt.execute(params![
                        session_id,
                        event.event_type,
                        format_datetime(&event.event_timestamp),
                        event.x,
                        event.y,
                        encode_json(event.data.as_ref())?,
                    ])?;
                }
            }

            let latest_at = format_datetime(&delta.latest_at);
            tx.execute(
                "UPDATE page_sessions
                 SET event_count = event_count + ?1,
                     click_count = click_count + ?2,
                     last_event_at = CASE
                         WHEN last_event_at IS NULL OR last_event_at < ?3 THEN ?3
                         ELSE last_event_at
                     END
                 WHERE id = ?4",
                params![to_i64(delta.events)?, to_i64(delta.clicks)?, latest_at, session_id],
            )?;

            tx.commit()?;
            Ok(Ok(events.len()))
        })
        .await
    }

    /// Events of a session in the order they happened.
    pub async fn list_events(&self, session_id: &str) -> Result<Vec<Event>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, page_session_id, event_type, event_timestamp, x, y, data
                 FROM events
                 WHERE page_session_id = ?1
                 ORDER BY event_timestamp ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }

            Ok(events)
        })
        .await
    }
}
