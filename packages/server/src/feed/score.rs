use chrono::{DateTime, Utc};

use crate::entity::video;

/// Hours after which recency stops decaying further (30 days).
const MAX_AGE_HOURS: f64 = 720.0;

/// Decay constant for the recency term (one week).
const RECENCY_DECAY_HOURS: f64 = 168.0;

/// Ranking score of a video at the current instant.
pub fn score(video: &video::Model) -> f64 {
    score_at(video, Utc::now())
}

/// Ranking score of a video as seen at `now`.
///
/// Sum of four non-negative terms: recency, popularity, likes and
/// engagement. A missing or future publish time counts as age zero.
/// Non-finite results collapse to `0.0`.
pub fn score_at(video: &video::Model, now: DateTime<Utc>) -> f64 {
    let hours_since_publish = video
        .published_at
        .filter(|published| *published <= now)
        .map(|published| (now - published).num_milliseconds() as f64 / 3_600_000.0)
        .unwrap_or(0.0)
        .clamp(0.0, MAX_AGE_HOURS);

    let views = video.view_count.max(0) as f64;
    let likes = video.like_count.max(0) as f64;

    let recency = (-hours_since_publish / RECENCY_DECAY_HOURS).exp() * 100.0;
    let popularity = (views + 1.0).log10() * 20.0;
    let like_score = (likes + 1.0).log10() * 30.0;
    let engagement = if views > 0.0 {
        (likes / views * 100.0).min(100.0)
    } else {
        0.0
    };

    let total = recency + popularity + like_score + engagement;
    if total.is_finite() { total } else { 0.0 }
}

/// Re-sort one fetched catalog page by descending score.
///
/// Only the videos of this page are compared with each other: the catalog
/// paginates by publish time and views first, so a high-scoring video on
/// page 2 never moves onto page 1. Equal scores keep their fetch order.
pub fn rank_page(videos: Vec<video::Model>, now: DateTime<Utc>) -> Vec<video::Model> {
    let mut scored: Vec<(f64, video::Model)> = videos
        .into_iter()
        .map(|video| (score_at(&video, now), video))
        .collect();
    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    scored.into_iter().map(|(_, video)| video).collect()
}
