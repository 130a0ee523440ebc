use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::UserScore,
};

fn row_to_user_score(row: &Row) -> Result<UserScore> {
    let updated_at: String = row.get("updated_at")?;

    Ok(UserScore {
        user_id: row.get("user_id")?,
        user_email: row.get("user_email")?,
        total_points: row.get("total_points")?,
        total_possible: row.get("total_possible")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn fetch_user_score(conn: &Connection, identity: &str) -> Result<Option<UserScore>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, user_email, total_points, total_possible, updated_at
         FROM user_scores
         WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query(params![identity])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_user_score(row)?)),
        None => Ok(None),
    }
}

impl Database {
    pub async fn get_user_score(&self, identity: &str) -> Result<Option<UserScore>> {
        let identity = identity.to_string();
        self.execute(move |conn| fetch_user_score(conn, &identity)).await
    }

    /// Adds `points`/`possible` to the running totals of `identity`. The read
    /// and the upsert share one write-locking transaction.
    pub async fn add_user_score(
        &self,
        identity: &str,
        email: Option<String>,
        points: f64,
        possible: f64,
        now: DateTime<Utc>,
    ) -> Result<UserScore> {
        let identity = identity.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let prior = fetch_user_score(&tx, &identity)?;
            let record = UserScore::accumulate(prior, &identity, email, points, possible, now);

            tx.execute(
                "INSERT INTO user_scores (user_id, user_email, total_points, total_possible, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     user_email = excluded.user_email,
                     total_points = excluded.total_points,
                     total_possible = excluded.total_possible,
                     updated_at = excluded.updated_at",
                params![
                    record.user_id,
                    record.user_email,
                    record.total_points,
                    record.total_possible,
                    format_datetime(&record.updated_at),
                ],
            )?;

            tx.commit()?;
            Ok(record)
        })
        .await
    }
}
