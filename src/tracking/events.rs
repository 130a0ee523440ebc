use chrono::{DateTime, Utc};

use crate::{
    db::models::{EventCounterDelta, EventInput, NewEvent},
    errors::TrackingError,
    timestamps,
};

/// A validated, non-empty batch of events with the counter deltas it
/// applies to its session.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub events: Vec<NewEvent>,
    pub delta: EventCounterDelta,
}

impl EventBatch {
    /// Validates every input before anything is written. Returns `None` for
    /// an empty batch.
    pub fn from_inputs(
        inputs: Vec<EventInput>,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, TrackingError> {
        let mut events = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            if input.event_type.trim().is_empty() {
                return Err(TrackingError::validation(format!(
                    "event {index} is missing an event_type"
                )));
            }
            events.push(NewEvent {
                event_type: input.event_type,
                event_timestamp: timestamps::normalize(input.ts_ms, input.timestamp, now),
                x: input.x,
                y: input.y,
                data: input.data,
            });
        }

        let Some(latest_at) = events.iter().map(|event| event.event_timestamp).max() else {
            return Ok(None);
        };
        let clicks = events.iter().filter(|event| event.is_click()).count() as u64;
        let delta = EventCounterDelta {
            events: events.len() as u64,
            clicks,
            latest_at,
        };

        Ok(Some(Self { events, delta }))
    }
}
