use serde::{Deserialize, Serialize};

/// Tunable weights for the per-session engagement score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    /// Points per click
    pub click_weight: f64,

    /// Points per recorded event, clicks included
    pub event_weight: f64,

    /// Session duration beyond this many seconds earns nothing more
    pub duration_cap_secs: i64,

    /// Seconds of duration per point
    pub seconds_per_point: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            click_weight: 3.0,
            event_weight: 1.5,
            duration_cap_secs: 3600,
            seconds_per_point: 12.0,
        }
    }
}

impl EngagementWeights {
    /// Largest score the duration term alone can contribute.
    pub fn max_duration_points(&self) -> f64 {
        if self.seconds_per_point > 0.0 {
            self.duration_cap_secs.max(0) as f64 / self.seconds_per_point
        } else {
            0.0
        }
    }
}
