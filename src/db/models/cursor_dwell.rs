//! Cursor dwell models and the merge rules for folding a new measurement
//! into a stored per-target total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptive fields of a UI target. Informational only; they never take
/// part in the totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DwellAttributes {
    pub label: Option<String>,
    pub center_x: Option<i64>,
    pub center_y: Option<i64>,
    pub radius: Option<i64>,
    pub metadata: Option<Value>,
}

impl DwellAttributes {
    /// Sparse update: each field takes the incoming value when one is
    /// present and keeps the prior value otherwise.
    pub fn overlay(self, incoming: DwellAttributes) -> Self {
        Self {
            label: incoming.label.or(self.label),
            center_x: incoming.center_x.or(self.center_x),
            center_y: incoming.center_y.or(self.center_y),
            radius: incoming.radius.or(self.radius),
            metadata: incoming.metadata.or(self.metadata),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorDwellMetric {
    pub page_session_id: String,
    pub target_key: String,
    #[serde(flatten)]
    pub attributes: DwellAttributes,
    pub total_duration_ms: u64,
    pub total_entries: u64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CursorDwellMetric {
    /// Folds `sample` into `prior` (or starts a new total). Totals add up,
    /// `first_seen` is kept from the prior row, `last_updated` becomes `now`.
    pub fn absorb(
        prior: Option<CursorDwellMetric>,
        page_session_id: &str,
        sample: &DwellSample,
        now: DateTime<Utc>,
    ) -> CursorDwellMetric {
        match prior {
            Some(prev) => CursorDwellMetric {
                page_session_id: prev.page_session_id,
                target_key: prev.target_key,
                attributes: prev.attributes.overlay(sample.attributes.clone()),
                total_duration_ms: prev.total_duration_ms.saturating_add(sample.duration_ms),
                total_entries: prev.total_entries.saturating_add(sample.entry_count),
                first_seen: prev.first_seen,
                last_updated: now,
            },
            None => CursorDwellMetric {
                page_session_id: page_session_id.to_string(),
                target_key: sample.target_key.clone(),
                attributes: sample.attributes.clone(),
                total_duration_ms: sample.duration_ms,
                total_entries: sample.entry_count,
                first_seen: now,
                last_updated: now,
            },
        }
    }
}

/// Raw dwell measurement as sent by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DwellInput {
    pub target_key: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub entry_count: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub center_x: Option<i64>,
    #[serde(default)]
    pub center_y: Option<i64>,
    #[serde(default)]
    pub radius: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Validated dwell measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct DwellSample {
    pub target_key: String,
    pub duration_ms: u64,
    pub entry_count: u64,
    pub attributes: DwellAttributes,
}

impl DwellSample {
    pub fn is_noop(&self) -> bool {
        self.duration_ms == 0 && self.entry_count == 0
    }
}
