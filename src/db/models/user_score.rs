use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative score row for one durable identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserScore {
    pub user_id: String,
    pub user_email: Option<String>,
    pub total_points: f64,
    pub total_possible: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserScore {
    /// Adds one already-normalized score event to `prior`. The email is only
    /// replaced when a new one is supplied.
    pub fn accumulate(
        prior: Option<UserScore>,
        identity: &str,
        email: Option<String>,
        points: f64,
        possible: f64,
        now: DateTime<Utc>,
    ) -> UserScore {
        match prior {
            Some(prev) => UserScore {
                user_id: prev.user_id,
                user_email: email.or(prev.user_email),
                total_points: prev.total_points + points,
                total_possible: prev.total_possible + possible,
                updated_at: now,
            },
            None => UserScore {
                user_id: identity.to_string(),
                user_email: email,
                total_points: points,
                total_possible: possible,
                updated_at: now,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreSummary {
    pub total_points: f64,
    pub total_possible: f64,
    pub score_percent: f64,
}

impl ScoreSummary {
    pub fn zero() -> Self {
        Self {
            total_points: 0.0,
            total_possible: 0.0,
            score_percent: 0.0,
        }
    }

    pub fn from_totals(total_points: f64, total_possible: f64) -> Self {
        let score_percent = if total_possible > 0.0 {
            total_points / total_possible * 100.0
        } else {
            0.0
        };
        Self {
            total_points,
            total_possible,
            score_percent,
        }
    }
}

impl From<Option<&UserScore>> for ScoreSummary {
    fn from(record: Option<&UserScore>) -> Self {
        match record {
            Some(score) => ScoreSummary::from_totals(score.total_points, score.total_possible),
            None => ScoreSummary::zero(),
        }
    }
}
