//! Song row model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A song (chord sheet) as returned by the list and get procedures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id_song: i64,
    pub id_account: i64,
    pub title: String,
    pub artist: String,
    /// Words interleaved with chord annotations, stored verbatim
    pub lyrics: String,
    pub original_key: Option<String>,
    pub category: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    #[serde(deserialize_with = "bit_flag")]
    pub deleted: bool,
}

/// Identifier returned by create, update and delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongId {
    pub id_song: i64,
}

/// Accept SQLite's 0/1 integers as well as JSON booleans
fn bit_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(serde::de::Error::custom(format!("invalid bit value: {}", n))),
        },
        other => Err(serde::de::Error::custom(format!("invalid bit value: {}", other))),
    }
}
