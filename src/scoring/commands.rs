use serde::Deserialize;

use crate::{db::models::ScoreSummary, errors::CommandError, AppState, CallerContext};

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreEventRequest {
    pub points_earned: f64,
    pub points_possible: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

pub async fn record_score_event(
    state: &AppState,
    caller: &CallerContext,
    request: ScoreEventRequest,
) -> Result<ScoreSummary, CommandError> {
    let identity = state
        .identity
        .resolve(caller.token(), request.user_email.as_deref())
        .await?;
    let summary = state
        .scores
        .record_score_event(
            &identity,
            request.points_earned,
            request.points_possible,
            request.source.as_deref(),
        )
        .await?;
    Ok(summary)
}

pub async fn get_my_score(
    state: &AppState,
    caller: &CallerContext,
    user_email: Option<String>,
) -> Result<ScoreSummary, CommandError> {
    let identity = state
        .identity
        .resolve(caller.token(), user_email.as_deref())
        .await?;
    Ok(state.scores.summary(&identity).await?)
}
