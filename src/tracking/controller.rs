use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{
        models::{
            CursorDwellMetric, DwellInput, Event, EventInput, PageSession,
            PageSessionFinalization, PageSessionStatus, SessionBinding, SessionRejection,
        },
        Database,
    },
    errors::TrackingError,
    log_info, log_warn,
    scoring::{engagement_score, EngagementWeights},
    timestamps::{self, ClientInstant},
};

use super::{dwell::validate_dwell_batch, events::EventBatch};

const ENABLE_LOGS: bool = true;

/// Optional client-supplied values for closing a page session.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SessionEnd {
    #[serde(default)]
    pub ended_at: Option<ClientInstant>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

/// Owns the page session lifecycle: open, record events and dwell, end.
#[derive(Clone)]
pub struct SessionTracker {
    db: Database,
    weights: EngagementWeights,
}

impl SessionTracker {
    pub fn new(db: Database, weights: EngagementWeights) -> Self {
        Self { db, weights }
    }

    pub async fn create(
        &self,
        binding: SessionBinding,
        page: Option<String>,
    ) -> Result<PageSession, TrackingError> {
        let page = page.map(|page| page.trim().to_string()).filter(|page| !page.is_empty());
        let session = PageSession::open(
            Uuid::new_v4().to_string(),
            binding.user_id,
            binding.user_session_id,
            page,
            Utc::now(),
        );
        self.db.insert_page_session(&session).await?;

        log_info!(
            "page session {} opened for {:?}",
            session.id,
            session.page.as_deref().unwrap_or("-")
        );
        Ok(session)
    }

    pub async fn record_event(
        &self,
        session_id: &str,
        event: EventInput,
    ) -> Result<usize, TrackingError> {
        self.record_events(session_id, vec![event]).await
    }

    /// Appends events and bumps the session counters atomically. An empty
    /// batch is a no-op and does not check the session.
    pub async fn record_events(
        &self,
        session_id: &str,
        events: Vec<EventInput>,
    ) -> Result<usize, TrackingError> {
        let Some(batch) = EventBatch::from_inputs(events, Utc::now())? else {
            return Ok(0);
        };

        self.db
            .append_events(session_id, batch.events, batch.delta)
            .await?
            .map_err(|rejection| TrackingError::from_rejection(rejection, session_id))
    }

    /// Folds dwell measurements into the session's per-target totals and
    /// returns the number of distinct targets touched.
    pub async fn merge_dwell(
        &self,
        session_id: &str,
        binding: SessionBinding,
        items: Vec<DwellInput>,
    ) -> Result<usize, TrackingError> {
        let samples = validate_dwell_batch(items)?;
        if samples.is_empty() {
            return Ok(0);
        }

        let outcome = self
            .db
            .merge_cursor_dwell(session_id, binding, samples, Utc::now())
            .await?;
        if let Err(SessionRejection::TokenMismatch) = outcome {
            log_warn!("rejected dwell merge on page session {session_id}: token mismatch");
        }
        outcome.map_err(|rejection| TrackingError::from_rejection(rejection, session_id))
    }

    /// Ends a session and stores its engagement score. Ending twice fails
    /// with `AlreadyEnded` and leaves the first result untouched.
    pub async fn end(
        &self,
        session_id: &str,
        request: SessionEnd,
    ) -> Result<PageSession, TrackingError> {
        if matches!(request.duration_seconds, Some(duration) if duration < 0) {
            return Err(TrackingError::validation("duration_seconds must be non-negative"));
        }

        let session = self
            .db
            .get_page_session(session_id)
            .await?
            .ok_or_else(|| TrackingError::page_session_not_found(session_id))?;
        if session.status() == PageSessionStatus::Ended {
            return Err(TrackingError::AlreadyEnded(session_id.to_string()));
        }

        let ended_at = timestamps::normalize(None, request.ended_at, Utc::now());
        let duration_seconds = request
            .duration_seconds
            .unwrap_or_else(|| elapsed_seconds(session.created_at, ended_at));
        let score = engagement_score(
            &self.weights,
            i64::try_from(session.click_count).unwrap_or(i64::MAX),
            i64::try_from(session.event_count).unwrap_or(i64::MAX),
            duration_seconds,
        );

        let finalization = PageSessionFinalization {
            session_id: session_id.to_string(),
            ended_at,
            duration_seconds,
            score,
            last_event_at: session.last_event_at.unwrap_or(ended_at),
        };

        match self.db.finalize_page_session(finalization.clone()).await? {
            Ok(()) => {}
            Err(SessionRejection::Ended) => {
                return Err(TrackingError::AlreadyEnded(session_id.to_string()))
            }
            Err(rejection) => return Err(TrackingError::from_rejection(rejection, session_id)),
        }

        log_info!(
            "page session {session_id} ended after {duration_seconds}s with score {score:.2}"
        );

        Ok(PageSession {
            ended_at: Some(finalization.ended_at),
            duration_seconds: Some(finalization.duration_seconds),
            last_event_at: Some(finalization.last_event_at),
            score: Some(finalization.score),
            ..session
        })
    }

    pub async fn get(&self, session_id: &str) -> Result<PageSession, TrackingError> {
        self.db
            .get_page_session(session_id)
            .await?
            .ok_or_else(|| TrackingError::page_session_not_found(session_id))
    }

    pub async fn events(&self, session_id: &str) -> Result<Vec<Event>, TrackingError> {
        self.get(session_id).await?;
        Ok(self.db.list_events(session_id).await?)
    }

    pub async fn dwell(&self, session_id: &str) -> Result<Vec<CursorDwellMetric>, TrackingError> {
        self.get(session_id).await?;
        Ok(self.db.list_cursor_dwell(session_id).await?)
    }
}

/// Whole seconds between two instants, never negative.
fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}
