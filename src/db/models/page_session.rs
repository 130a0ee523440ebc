//! Page session models.
//!
//! A page session is one visit-scoped tracking record. It is `Open` from
//! creation until `end` stamps `ended_at`, after which it is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageSessionStatus {
    Open,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSession {
    pub id: String,
    pub user_id: Option<i64>,
    /// Linking-session token of the client that owns this page session.
    pub user_session_id: Option<String>,
    pub page: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub event_count: u64,
    pub click_count: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
}

impl PageSession {
    pub fn open(
        id: String,
        user_id: Option<i64>,
        user_session_id: Option<String>,
        page: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            user_session_id,
            page,
            created_at,
            ended_at: None,
            duration_seconds: None,
            event_count: 0,
            click_count: 0,
            last_event_at: None,
            score: None,
        }
    }

    pub fn status(&self) -> PageSessionStatus {
        if self.ended_at.is_some() {
            PageSessionStatus::Ended
        } else {
            PageSessionStatus::Open
        }
    }
}

/// Values written by the single finalize update at session end.
#[derive(Debug, Clone)]
pub struct PageSessionFinalization {
    pub session_id: String,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub score: f64,
    pub last_event_at: DateTime<Utc>,
}

/// Why the store refused a write against a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    Missing,
    Ended,
    TokenMismatch,
}

/// The caller as seen by a session write: its linking token and, when the
/// token is authenticated, its user id.
#[derive(Debug, Clone, Default)]
pub struct SessionBinding {
    pub user_session_id: Option<String>,
    pub user_id: Option<i64>,
}
