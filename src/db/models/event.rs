use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timestamps::ClientInstant;

pub const CLICK_EVENT_TYPE: &str = "click";

/// Stored interaction event. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: i64,
    pub page_session_id: String,
    pub event_type: String,
    pub event_timestamp: DateTime<Utc>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub data: Option<Value>,
}

/// Event with its instant already normalized, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: String,
    pub event_timestamp: DateTime<Utc>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub data: Option<Value>,
}

impl NewEvent {
    pub fn is_click(&self) -> bool {
        self.event_type == CLICK_EVENT_TYPE
    }
}

/// Raw event as sent by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventInput {
    pub event_type: String,
    #[serde(default)]
    pub x: Option<i64>,
    #[serde(default)]
    pub y: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<ClientInstant>,
    #[serde(default)]
    pub ts_ms: Option<i64>,
}

/// Counter deltas applied to the owning session together with an insert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventCounterDelta {
    pub events: u64,
    pub clicks: u64,
    pub latest_at: DateTime<Utc>,
}
