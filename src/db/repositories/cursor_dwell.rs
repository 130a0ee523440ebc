use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{decode_json, encode_json, format_datetime, parse_datetime, to_i64, to_u64},
    models::{
        CursorDwellMetric, DwellAttributes, DwellSample, SessionBinding, SessionRejection,
    },
};

use super::page_sessions::require_open_session;

fn row_to_cursor_dwell(row: &Row) -> Result<CursorDwellMetric> {
    let first_seen: String = row.get("first_seen")?;
    let last_updated: String = row.get("last_updated")?;
    let extra_metadata: Option<String> = row.get("extra_metadata")?;
    let total_duration_ms: i64 = row.get("total_duration_ms")?;
    let total_entries: i64 = row.get("total_entries")?;

    Ok(CursorDwellMetric {
        page_session_id: row.get("page_session_id")?,
        target_key: row.get("target_key")?,
        attributes: DwellAttributes {
            label: row.get("target_label")?,
            center_x: row.get("center_x")?,
            center_y: row.get("center_y")?,
            radius: row.get("radius")?,
            metadata: decode_json(extra_metadata),
        },
        total_duration_ms: to_u64(total_duration_ms, "total_duration_ms")?,
        total_entries: to_u64(total_entries, "total_entries")?,
        first_seen: parse_datetime(&first_seen, "first_seen")?,
        last_updated: parse_datetime(&last_updated, "last_updated")?,
    })
}

fn fetch_cursor_dwell(
    conn: &Connection,
    session_id: &str,
    target_key: &str,
) -> Result<Option<CursorDwellMetric>> {
    let mut stmt = conn.prepare_cached(
        "SELECT page_session_id, target_key, target_label, center_x, center_y, radius,
                extra_metadata, total_duration_ms, total_entries, first_seen, last_updated
         FROM cursor_dwell_metrics
         WHERE page_session_id = ?1 AND target_key = ?2",
    )?;
    let mut rows = stmt.query(params![session_id, target_key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_cursor_dwell(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Merges dwell samples into the per-target totals of one page session.
    ///
    /// The session row is checked, ownership is bound or verified, prior
    /// totals are read and the merged rows are upserted, all inside one
    /// write-locking transaction, so concurrent merges on the same target
    /// cannot lose an increment. Returns the number of distinct targets
    /// written.
    pub async fn merge_cursor_dwell(
        &self,
        session_id: &str,
        binding: SessionBinding,
        samples: Vec<DwellSample>,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<usize, SessionRejection>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let session = match require_open_session(&tx, &session_id)? {
                Ok(session) => session,
                Err(rejection) => return Ok(Err(rejection)),
            };

            let mut bind_token: Option<String> = None;
            match (&session.user_session_id, &binding.user_session_id) {
                (Some(bound), Some(caller)) if bound == caller => {}
                (Some(_), _) => return Ok(Err(SessionRejection::TokenMismatch)),
                (None, Some(caller)) => bind_token = Some(caller.clone()),
                (None, None) => {}
            }
            let bind_user = match (session.user_id, binding.user_id) {
                (None, Some(user_id)) => Some(user_id),
                _ => None,
            };

            let mut order: Vec<String> = Vec::new();
            let mut merged: HashMap<String, CursorDwellMetric> = HashMap::new();
            let mut duration_total: u64 = 0;
            let mut entry_total: u64 = 0;

            for sample in &samples {
                let prior = match merged.remove(&sample.target_key) {
                    Some(pending) => Some(pending),
                    None => {
                        order.push(sample.target_key.clone());
                        fetch_cursor_dwell(&tx, &session_id, &sample.target_key)?
                    }
                };
                let metric = CursorDwellMetric::absorb(prior, &session_id, sample, now);
                merged.insert(sample.target_key.clone(), metric);
                duration_total = duration_total.saturating_add(sample.duration_ms);
                entry_total = entry_total.saturating_add(sample.entry_count);
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO cursor_dwell_metrics (
                        page_session_id,
                        target_key,
                        target_label,
                        center_x,
                        center_y,
                        radius,
                        extra_metadata,
                        total_duration_ms,
                        total_entries,
                        first_seen,
                        last_updated
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(page_session_id, target_key) DO UPDATE SET
                        target_label = excluded.target_label,
                        center_x = excluded.center_x,
                        center_y = excluded.center_y,
                        radius = excluded.radius,
                        extra_metadata = excluded.extra_metadata,
                        total_duration_ms = excluded.total_duration_ms,
                        total_entries = excluded.total_entries,
                        last_updated = excluded.last_updated",
                )?;
                for key in &order {
                    let Some(metric) = merged.get(key) else {
                        continue;
                    };
                    stmt.execute(params![
                        metric.page_session_id,
                        metric.target_key,
                        metric.attributes.label,
                        metric.attributes.center_x,
                        metric.attributes.center_y,
                        metric.attributes.radius,
                        encode_json(metric.attributes.metadata.as_ref())?,
                        to_i64(metric.total_duration_ms)?,
                        to_i64(metric.total_entries)?,
                        format_datetime(&metric.first_seen),
                        format_datetime(&metric.last_updated),
                    ])?;
                }
            }

            if let Some(token) = bind_token {
                tx.execute(
                    "UPDATE page_sessions SET user_session_id = ?1 WHERE id = ?2",
                    params![token, session_id],
                )?;
            }
            if let Some(user_id) = bind_user {
                tx.execute(
                    "UPDATE page_sessions SET user_id = ?1 WHERE id = ?2",
                    params![user_id, session_id],
                )?;
            }
            if duration_total > 0 || entry_total > 0 {
                let touched_at = format_datetime(&now);
                tx.execute(
                    "UPDATE page_sessions
                     SET event_count = event_count + ?1,
                         last_event_at = CASE
                             WHEN last_event_at IS NULL OR last_event_at < ?2 THEN ?2
                             ELSE last_event_at
                         END
                     WHERE id = ?3",
                    params![to_i64(entry_total)?, touched_at, session_id],
                )?;
            }

            tx.commit()?;
            Ok(Ok(order.len()))
        })
        .await
    }

    pub async fn list_cursor_dwell(&self, session_id: &str) -> Result<Vec<CursorDwellMetric>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT page_session_id, target_key, target_label, center_x, center_y, radius,
                        extra_metadata, total_duration_ms, total_entries, first_seen, last_updated
                 FROM cursor_dwell_metrics
                 WHERE page_session_id = ?1
                 ORDER BY target_key ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut metrics = Vec::new();
            while let Some(row) = rows.next()? {
                metrics.push(row_to_cursor_dwell(row)?);
            }

            Ok(metrics)
        })
        .await
    }
}
