use serde::{Deserialize, Serialize};

use crate::{
    db::models::{CursorDwellMetric, DwellInput, Event, EventInput, PageSession},
    errors::CommandError,
    AppState, CallerContext,
};

use super::SessionEnd;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBatchRequest {
    pub events: Vec<EventInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DwellBatchRequest {
    pub items: Vec<DwellInput>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionCreated {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Detail {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Inserted {
    pub inserted: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Updated {
    pub updated: usize,
}

pub async fn start_page_session(
    state: &AppState,
    caller: &CallerContext,
    request: StartSessionRequest,
) -> Result<SessionCreated, CommandError> {
    let binding = state.identity.binding(caller.token()).await?;
    let session = state.tracker.create(binding, request.page).await?;
    Ok(SessionCreated { id: session.id })
}

pub async fn record_page_event(
    state: &AppState,
    _caller: &CallerContext,
    session_id: String,
    event: EventInput,
) -> Result<Detail, CommandError> {
    state.tracker.record_event(&session_id, event).await?;
    Ok(Detail {
        detail: "event recorded".into(),
    })
}

pub async fn record_page_events(
    state: &AppState,
    _caller: &CallerContext,
    session_id: String,
    request: EventBatchRequest,
) -> Result<Inserted, CommandError> {
    let inserted = state
        .tracker
        .record_events(&session_id, request.events)
        .await?;
    Ok(Inserted { inserted })
}

pub async fn record_cursor_dwell(
    state: &AppState,
    caller: &CallerContext,
    session_id: String,
    request: DwellBatchRequest,
) -> Result<Updated, CommandError> {
    let binding = state.identity.binding(caller.token()).await?;
    let updated = state
        .tracker
        .merge_dwell(&session_id, binding, request.items)
        .await?;
    Ok(Updated { updated })
}

pub async fn end_page_session(
    state: &AppState,
    _caller: &CallerContext,
    session_id: String,
    request: SessionEnd,
) -> Result<Detail, CommandError> {
    state.tracker.end(&session_id, request).await?;
    Ok(Detail {
        detail: "session ended".into(),
    })
}

pub async fn get_page_session(
    state: &AppState,
    session_id: String,
) -> Result<PageSession, CommandError> {
    Ok(state.tracker.get(&session_id).await?)
}

pub async fn list_page_events(
    state: &AppState,
    session_id: String,
) -> Result<Vec<Event>, CommandError> {
    Ok(state.tracker.events(&session_id).await?)
}

pub async fn list_cursor_dwell(
    state: &AppState,
    session_id: String,
) -> Result<Vec<CursorDwellMetric>, CommandError> {
    Ok(state.tracker.dwell(&session_id).await?)
}
