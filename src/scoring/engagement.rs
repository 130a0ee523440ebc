use super::config::EngagementWeights;

/// Engagement score of a finished page session.
///
/// Negative inputs count as zero and the duration term saturates at the
/// configured cap, so the score is monotone in every argument.
pub fn engagement_score(
    weights: &EngagementWeights,
    clicks: i64,
    events: i64,
    duration_seconds: i64,
) -> f64 {
    let clicks = clicks.max(0) as f64;
    let events = events.max(0) as f64;
    let capped = duration_seconds.clamp(0, weights.duration_cap_secs.max(0)) as f64;

    let duration_points = if weights.seconds_per_point > 0.0 {
        capped / weights.seconds_per_point
    } else {
        0.0
    };

    clicks * weights.click_weight + events * weights.event_weight + duration_points
}
