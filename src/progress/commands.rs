use crate::{
    db::models::{VideoProgress, VideoProgressInput, VideoProgressQuery},
    errors::CommandError,
    AppState,
};

pub async fn upsert_video_progress(
    state: &AppState,
    request: VideoProgressInput,
) -> Result<VideoProgress, CommandError> {
    Ok(state.progress.upsert(request).await?)
}

pub async fn list_video_progress(
    state: &AppState,
    query: VideoProgressQuery,
) -> Result<Vec<VideoProgress>, CommandError> {
    Ok(state.progress.list(query).await?)
}
