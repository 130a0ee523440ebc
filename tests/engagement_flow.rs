use engagement_tracker::{
    db::models::{DwellInput, EventInput, VideoProgressInput, VideoProgressQuery},
    progress::commands::{list_video_progress, upsert_video_progress},
    scoring::commands::{get_my_score, record_score_event, ScoreEventRequest},
    settings::TrackerSettings,
    tracking::{
        commands::{
            end_page_session, get_page_session, list_cursor_dwell, list_page_events,
            record_cursor_dwell, record_page_event, record_page_events, start_page_session,
            DwellBatchRequest, EventBatchRequest, StartSessionRequest,
        },
        SessionEnd,
    },
    AppState, CallerContext, ErrorKind,
};
use serde_json::json;
use tempfile::TempDir;

fn open_state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let state = reopen(&dir, 5_000);
    (dir, state)
}

fn reopen(dir: &TempDir, store_timeout_ms: u64) -> AppState {
    let settings = TrackerSettings {
        db_path: dir.path().join("flow.sqlite3"),
        store_timeout_ms,
        ..TrackerSettings::default()
    };
    AppState::open(settings).unwrap()
}

fn click(ts_ms: i64) -> EventInput {
    EventInput {
        event_type: "click".into(),
        ts_ms: Some(ts_ms),
        ..EventInput::default()
    }
}

fn dwell(key: &str, duration_ms: i64, entry_count: i64) -> DwellInput {
    DwellInput {
        target_key: key.into(),
        duration_ms,
        entry_count: Some(entry_count),
        ..DwellInput::default()
    }
}

fn score(earned: f64, possible: f64) -> ScoreEventRequest {
    ScoreEventRequest {
        points_earned: earned,
        points_possible: possible,
        source: Some("quiz".into()),
        user_email: None,
    }
}

#[tokio::test]
async fn page_session_lifecycle() {
    let (_dir, state) = open_state();
    let caller = CallerContext::with_token("browser-token");

    let created = start_page_session(
        &state,
        &caller,
        StartSessionRequest {
            page: Some("/course/intro".into()),
        },
    )
    .await
    .unwrap();

    let detail = record_page_event(&state, &caller, created.id.clone(), click(1_700_000_000_000))
        .await
        .unwrap();
    assert_eq!(detail.detail, "event recorded");

    let batch: EventBatchRequest = serde_json::from_value(json!({
        "events": [
            {"event_type": "click", "ts_ms": 1_700_000_005_000_i64},
            {"event_type": "scroll", "timestamp": "2023-11-14T22:13:30Z"},
            {"event_type": "video_play", "data": {"video": "intro"}}
        ]
    }))
    .unwrap();
    let inserted = record_page_events(&state, &caller, created.id.clone(), batch)
        .await
        .unwrap();
    assert_eq!(inserted.inserted, 3);

    let first = record_cursor_dwell(
        &state,
        &caller,
        created.id.clone(),
        DwellBatchRequest {
            items: vec![dwell("btn1", 500, 1)],
        },
    )
    .await
    .unwrap();
    assert_eq!(first.updated, 1);
    record_cursor_dwell(
        &state,
        &caller,
        created.id.clone(),
        DwellBatchRequest {
            items: vec![dwell("btn1", 300, 2)],
        },
    )
    .await
    .unwrap();

    let metrics = list_cursor_dwell(&state, created.id.clone()).await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].total_duration_ms, 800);
    assert_eq!(metrics[0].total_entries, 3);

    let events = list_page_events(&state, created.id.clone()).await.unwrap();
    assert_eq!(events.len(), 4);

    let session = get_page_session(&state, created.id.clone()).await.unwrap();
    assert_eq!(session.user_session_id.as_deref(), Some("browser-token"));
    assert_eq!(session.page.as_deref(), Some("/course/intro"));
    assert_eq!(session.click_count, 2);
    assert_eq!(session.event_count, 4 + 3);

    let ended = end_page_session(
        &state,
        &caller,
        created.id.clone(),
        SessionEnd {
            ended_at: None,
            duration_seconds: Some(120),
        },
    )
    .await
    .unwrap();
    assert_eq!(ended.detail, "session ended");

    let finished = get_page_session(&state, created.id.clone()).await.unwrap();
    // 2 clicks, 7 counted events, 120 s
    assert_eq!(finished.score, Some(2.0 * 3.0 + 7.0 * 1.5 + 10.0));

    let again = end_page_session(&state, &caller, created.id.clone(), SessionEnd::default())
        .await
        .unwrap_err();
    assert_eq!(again.kind, ErrorKind::AlreadyEnded);
    assert!(!again.retryable);
}

#[tokio::test]
async fn foreign_client_cannot_write_dwell() {
    let (_dir, state) = open_state();
    let owner = CallerContext::with_token("owner");
    let created = start_page_session(&state, &owner, StartSessionRequest::default())
        .await
        .unwrap();

    let err = record_cursor_dwell(
        &state,
        &CallerContext::with_token("intruder"),
        created.id.clone(),
        DwellBatchRequest {
            items: vec![dwell("btn1", 100, 1)],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
    assert!(list_cursor_dwell(&state, created.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_session_writes_nothing() {
    let (_dir, state) = open_state();
    let caller = CallerContext::anonymous();

    let err = record_page_events(
        &state,
        &caller,
        "does-not-exist".into(),
        EventBatchRequest {
            events: vec![click(1_700_000_000_000)],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(list_page_events(&state, "does-not-exist".into())
        .await
        .is_err());
    assert!(state.db.list_events("does-not-exist").await.unwrap().is_empty());
}

#[tokio::test]
async fn scores_accumulate_per_user() {
    let (_dir, state) = open_state();
    let user = state
        .db
        .insert_user("Grace".into(), "grace@example.com".into())
        .await
        .unwrap();
    let session = state.identity.open_session(Some(user.id)).await.unwrap();
    let caller = CallerContext::with_token(session.id);

    let empty = get_my_score(&state, &caller, None).await.unwrap();
    assert_eq!(empty.total_possible, 0.0);

    record_score_event(&state, &caller, score(10.0, 10.0)).await.unwrap();
    let summary = record_score_event(&state, &caller, score(5.0, 0.0)).await.unwrap();
    assert_eq!(summary.total_points, 15.0);
    assert_eq!(summary.total_possible, 15.0);
    assert_eq!(summary.score_percent, 100.0);

    let stored = state
        .db
        .get_user_score(&format!("user:{}", user.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_email.as_deref(), Some("grace@example.com"));

    let err = record_score_event(&state, &caller, score(3.0, 2.0)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn anonymous_scoring_needs_an_email() {
    let (_dir, state) = open_state();
    let caller = CallerContext::anonymous();

    let err = get_my_score(&state, &caller, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let request = ScoreEventRequest {
        user_email: Some("Guest@Example.com".into()),
        ..score(1.0, 4.0)
    };
    record_score_event(&state, &caller, request).await.unwrap();

    let summary = get_my_score(&state, &caller, Some("guest@example.com".into()))
        .await
        .unwrap();
    assert_eq!(summary.score_percent, 25.0);
}

#[tokio::test]
async fn video_progress_round_trip() {
    let (_dir, state) = open_state();
    let report: VideoProgressInput = serde_json::from_value(json!({
        "user_id": "learner-9",
        "video_id": "intro",
        "progress": 0.4,
        "position_seconds": 72.5,
        "duration_seconds": 180.0,
        "event_name": "pause",
        "event_timestamp": "2024-04-01T09:00:00"
    }))
    .unwrap();
    let stored = upsert_video_progress(&state, report).await.unwrap();
    assert_eq!(stored.event_name.as_deref(), Some("pause"));

    let rows = list_video_progress(
        &state,
        VideoProgressQuery {
            user_id: Some("learner-9".into()),
            ..VideoProgressQuery::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, stored.id);

    let err = list_video_progress(&state, VideoProgressQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn far_future_epoch_does_not_wedge_the_session() {
    let (_dir, state) = open_state();
    let caller = CallerContext::with_token("browser-token");
    let created = start_page_session(&state, &caller, StartSessionRequest::default())
        .await
        .unwrap();

    record_page_event(&state, &caller, created.id.clone(), click(253_402_300_800_000))
        .await
        .unwrap();

    let session = get_page_session(&state, created.id.clone()).await.unwrap();
    assert_eq!(session.click_count, 1);
    assert_eq!(list_page_events(&state, created.id.clone()).await.unwrap().len(), 1);
    end_page_session(&state, &caller, created.id.clone(), SessionEnd::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn timed_out_batch_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let caller = CallerContext::with_token("browser-token");
    let session_id = {
        let state = reopen(&dir, 5_000);
        let created = start_page_session(&state, &caller, StartSessionRequest::default())
            .await
            .unwrap();
        state.shutdown();
        created.id
    };

    let hurried = reopen(&dir, 1);
    let batch = EventBatchRequest {
        events: (0..50_000).map(|i| click(1_700_000_000_000 + i)).collect(),
    };
    let outcome = record_page_events(&hurried, &caller, session_id.clone(), batch).await;
    hurried.shutdown();

    let state = reopen(&dir, 5_000);
    let session = get_page_session(&state, session_id.clone()).await.unwrap();
    let stored = list_page_events(&state, session_id.clone()).await.unwrap().len();
    match outcome {
        Ok(inserted) => {
            assert_eq!(inserted.inserted, 50_000);
            assert_eq!(session.event_count, 50_000);
            assert_eq!(stored, 50_000);
        }
        Err(err) => {
            assert!(err.retryable);
            assert_eq!(session.event_count, 0);
            assert_eq!(stored, 0);
        }
    }
    state.shutdown();
}

#[tokio::test]
async fn commands_fail_retryably_after_shutdown() {
    let (_dir, state) = open_state();
    state.shutdown();

    let err = start_page_session(&state, &CallerContext::anonymous(), StartSessionRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    assert!(err.retryable);
}

#[tokio::test]
async fn start_reads_settings_file() {
    let dir = TempDir::new().unwrap();
    let settings_path = dir.path().join("settings.json");
    let settings = TrackerSettings {
        db_path: dir.path().join("nested").join("started.sqlite3"),
        ..TrackerSettings::default()
    };
    settings.save(&settings_path).unwrap();

    let state = engagement_tracker::start(Some(&settings_path)).unwrap();
    assert!(state.db.path().ends_with("nested/started.sqlite3"));
    let created = start_page_session(&state, &CallerContext::anonymous(), StartSessionRequest::default())
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    state.shutdown();
}
