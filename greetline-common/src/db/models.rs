//! Database models

use serde::{Deserialize, Serialize};

/// A playable audio item, keyed by its url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub url: String,
}

/// The active track association for one phone line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Greeting {
    pub id: i64,
    pub phone: String,
    pub track_id: Option<i64>,
}

/// Track fields as delivered by the music-search provider, before persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackData {
    pub title: String,
    pub artist: String,
    pub url: String,
}
