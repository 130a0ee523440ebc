use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime},
    models::{AuthSession, User},
};

fn row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
    })
}

fn row_to_auth_session(row: &Row) -> Result<AuthSession> {
    let created_at: String = row.get("created_at")?;
    let expires_at: Option<String> = row.get("expires_at")?;

    Ok(AuthSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        expires_at: parse_optional_datetime(expires_at, "expires_at")?,
    })
}

impl Database {
    /// Seeds a user row for the credential layer.
    pub async fn insert_user(&self, name: String, email: String) -> Result<User> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (name, email) VALUES (?1, ?2)",
                params![name, email],
            )?;
            let user_id = conn.last_insert_rowid();

            conn.query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                params![user_id],
                row_to_user,
            )
            .optional()?
            .ok_or_else(|| anyhow!("User not found after insert"))
        })
        .await
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        self.execute(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, name, email FROM users WHERE id = ?1",
                    params![user_id],
                    row_to_user,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    /// Issues a linking-session token. Sessions bound to a user expire after
    /// `lifetime`; anonymous ones never do.
    pub async fn create_auth_session(
        &self,
        user_id: Option<i64>,
        lifetime: Duration,
    ) -> Result<AuthSession> {
        let now = Utc::now();
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            expires_at: user_id.map(|_| now + lifetime),
        };
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO auth_sessions (id, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.user_id,
                    format_datetime(&record.created_at),
                    format_optional_datetime(record.expires_at.as_ref()),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(session)
    }

    pub async fn get_auth_session(&self, token: &str) -> Result<Option<AuthSession>> {
        let token = token.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, created_at, expires_at
                 FROM auth_sessions
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![token])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_auth_session(row)?)),
                None => Ok(None),
            }
        })
        .await
    }
}
