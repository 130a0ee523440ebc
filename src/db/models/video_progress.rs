//! Per-user playback progress, one row per (user, video).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamps::ClientInstant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoProgress {
    pub id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub video_id: String,
    pub video_url: Option<String>,
    pub progress: f64,
    pub position_seconds: f64,
    pub duration_seconds: Option<f64>,
    pub stream_selected: Option<String>,
    pub task_status: Option<String>,
    pub event_name: Option<String>,
    pub last_event_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoProgressInput {
    pub user_id: String,
    pub video_id: String,
    #[serde(default)]
    pub video_url: Option<String>,
    pub progress: f64,
    pub position_seconds: f64,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub stream_selected: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_timestamp: Option<ClientInstant>,
    #[serde(default)]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoProgressQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}
