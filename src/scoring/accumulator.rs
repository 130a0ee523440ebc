use chrono::Utc;

use crate::{
    db::{models::ScoreSummary, Database},
    errors::TrackingError,
    identity::ResolvedIdentity,
    log_error, log_info,
};

const ENABLE_LOGS: bool = true;

/// Validated score event. With nothing possible the earned points count
/// as possible too, so bonus points never push the percent above 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreDelta {
    pub earned: f64,
    pub possible: f64,
}

impl ScoreDelta {
    pub fn validate(earned: f64, possible: f64) -> Result<Self, TrackingError> {
        if !earned.is_finite() || !possible.is_finite() {
            return Err(TrackingError::validation("score points must be finite numbers"));
        }
        if earned < 0.0 || possible < 0.0 {
            return Err(TrackingError::validation("score points must be non-negative"));
        }
        if possible > 0.0 && earned > possible {
            return Err(TrackingError::validation(format!(
                "points earned ({earned}) exceed points possible ({possible})"
            )));
        }

        let possible = if possible == 0.0 { earned } else { possible };
        Ok(Self { earned, possible })
    }
}

#[derive(Clone)]
pub struct ScoreAccumulator {
    db: Database,
}

impl ScoreAccumulator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds one score event to the identity's running totals and returns the
    /// updated summary. `source` is only used for logging.
    pub async fn record_score_event(
        &self,
        identity: &ResolvedIdentity,
        earned: f64,
        possible: f64,
        source: Option<&str>,
    ) -> Result<ScoreSummary, TrackingError> {
        let delta = ScoreDelta::validate(earned, possible)?;

        let record = self
            .db
            .add_user_score(
                &identity.key,
                identity.email.clone(),
                delta.earned,
                delta.possible,
                Utc::now(),
            )
            .await
            .map_err(|err| {
                log_error!("failed to record score for {}: {err:#}", identity.key);
                TrackingError::from(err)
            })?;

        log_info!(
            "score event for {} from {}: +{}/{}",
            identity.key,
            source.unwrap_or("unknown"),
            delta.earned,
            delta.possible
        );

        Ok(ScoreSummary::from(Some(&record)))
    }

    /// Current totals; an identity with no events reads as zero.
    pub async fn summary(&self, identity: &ResolvedIdentity) -> Result<ScoreSummary, TrackingError> {
        let record = self.db.get_user_score(&identity.key).await?;
        Ok(ScoreSummary::from(record.as_ref()))
    }
}
