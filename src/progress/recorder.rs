use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{
        models::{VideoProgress, VideoProgressInput, VideoProgressQuery},
        Database, VideoProgressFilter,
    },
    errors::TrackingError,
    timestamps,
};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

fn required(value: &str, field: &str) -> Result<String, TrackingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackingError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Playback progress per (user, video); the latest report wins.
#[derive(Clone)]
pub struct ProgressRecorder {
    db: Database,
}

impl ProgressRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, input: VideoProgressInput) -> Result<VideoProgress, TrackingError> {
        let user_id = required(&input.user_id, "user_id")?;
        let video_id = required(&input.video_id, "video_id")?;

        if !input.progress.is_finite() || !(0.0..=1.0).contains(&input.progress) {
            return Err(TrackingError::validation("progress must be between 0 and 1"));
        }
        if !input.position_seconds.is_finite() || input.position_seconds < 0.0 {
            return Err(TrackingError::validation("position_seconds must be non-negative"));
        }
        if let Some(duration) = input.duration_seconds {
            if !duration.is_finite() || duration < 0.0 {
                return Err(TrackingError::validation("duration_seconds must be non-negative"));
            }
        }

        let now = Utc::now();
        let event_time = timestamps::normalize(None, input.event_timestamp, now);

        let record = VideoProgress {
            id: Uuid::new_v4().to_string(),
            user_id,
            user_email: optional(input.user_email),
            video_id,
            video_url: input.video_url,
            progress: input.progress,
            position_seconds: input.position_seconds,
            duration_seconds: input.duration_seconds,
            stream_selected: input.stream_selected,
            task_status: input.task_status,
            event_name: input.event_name,
            last_event_at: event_time,
            updated_at: event_time,
            created_at: now,
        };

        Ok(self.db.upsert_video_progress(record).await?)
    }

    /// Newest first. At least one of `user_id` or `user_email` must be given.
    pub async fn list(&self, query: VideoProgressQuery) -> Result<Vec<VideoProgress>, TrackingError> {
        let filter = VideoProgressFilter {
            user_id: optional(query.user_id),
            user_email: optional(query.user_email),
            video_id: optional(query.video_id),
        };
        if filter.user_id.is_none() && filter.user_email.is_none() {
            return Err(TrackingError::validation(
                "user_id or user_email must be provided",
            ));
        }

        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        Ok(self.db.list_video_progress(filter, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::{errors::ErrorKind, timestamps::ClientInstant};

    fn recorder() -> (TempDir, ProgressRecorder) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("progress.sqlite3"), Duration::from_secs(5)).unwrap();
        (dir, ProgressRecorder::new(db))
    }

    fn report(video_id: &str, progress: f64, minute: u32) -> VideoProgressInput {
        VideoProgressInput {
            user_id: "u-1".into(),
            video_id: video_id.into(),
            progress,
            position_seconds: 30.0,
            event_timestamp: Some(ClientInstant::from(
                Utc.with_ymd_and_hms(2024, 4, 1, 9, minute, 0).unwrap(),
            )),
            user_email: Some("u1@example.com".into()),
            ..VideoProgressInput::default()
        }
    }

    #[tokio::test]
    async fn second_report_updates_in_place() {
        let (_dir, recorder) = recorder();
        let first = recorder.upsert(report("v-1", 0.2, 0)).await.unwrap();
        let second = recorder.upsert(report("v-1", 0.6, 5)).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.progress, 0.6);
        assert_eq!(
            second.updated_at,
            Utc.with_ymd_and_hms(2024, 4, 1, 9, 5, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_clamps_limit() {
        let (_dir, recorder) = recorder();
        recorder.upsert(report("v-1", 0.1, 1)).await.unwrap();
        recorder.upsert(report("v-2", 0.1, 3)).await.unwrap();
        recorder.upsert(report("v-3", 0.1, 2)).await.unwrap();

        let all = recorder
            .list(VideoProgressQuery {
                user_id: Some("u-1".into()),
                ..VideoProgressQuery::default()
            })
            .await
            .unwrap();
        let order: Vec<_> = all.iter().map(|row| row.video_id.as_str()).collect();
        assert_eq!(order, ["v-2", "v-3", "v-1"]);

        let clamped = recorder
            .list(VideoProgressQuery {
                user_email: Some("u1@example.com".into()),
                limit: Some(0),
                ..VideoProgressQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(clamped.len(), 1);

        let one_video = recorder
            .list(VideoProgressQuery {
                user_id: Some("u-1".into()),
                video_id: Some("v-3".into()),
                limit: Some(500),
                ..VideoProgressQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(one_video.len(), 1);
    }

    #[tokio::test]
    async fn far_future_event_time_uses_now() {
        let (_dir, recorder) = recorder();
        let year_10000 = chrono::NaiveDate::from_ymd_opt(10_000, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let stored = recorder
            .upsert(VideoProgressInput {
                event_timestamp: Some(ClientInstant::Naive(year_10000)),
                ..report("v-9", 0.3, 0)
            })
            .await
            .unwrap();
        assert_eq!(stored.updated_at, stored.created_at);

        let rows = recorder
            .list(VideoProgressQuery {
                user_id: Some("u-1".into()),
                ..VideoProgressQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(rows[0].id, stored.id);
    }

    #[tokio::test]
    async fn invalid_reports_are_rejected() {
        let (_dir, recorder) = recorder();
        for bad in [
            report("v-1", 1.5, 0),
            report("v-1", f64::NAN, 0),
            VideoProgressInput {
                position_seconds: -1.0,
                ..report("v-1", 0.5, 0)
            },
            VideoProgressInput {
                duration_seconds: Some(-3.0),
                ..report("v-1", 0.5, 0)
            },
            report(" ", 0.5, 0),
        ] {
            let err = recorder.upsert(bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let err = recorder.list(VideoProgressQuery::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
