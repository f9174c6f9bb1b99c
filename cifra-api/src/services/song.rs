//! Song entity operations
//!
//! One function per procedure. Each takes a typed request record, calls the
//! gateway, and decodes the result into the song models. Errors pass through
//! unchanged; deciding what they mean to a client is the handler's job.

use cifra_common::db::{
    DbError, DbResult, ExpectedReturn, Gateway, Song, SongId, SP_SONG_CREATE, SP_SONG_DELETE,
    SP_SONG_GET, SP_SONG_LIST, SP_SONG_UPDATE,
};
use serde::Serialize;

use crate::crud::CallerIdentity;

/// Editable song fields, as accepted by create and update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongFields {
    pub title: String,
    pub artist: String,
    pub lyrics: String,
    pub original_key: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongCreateRequest {
    pub id_account: i64,
    pub id_user: i64,
    #[serde(flatten)]
    pub fields: SongFields,
}

impl SongCreateRequest {
    pub fn new(caller: CallerIdentity, fields: SongFields) -> Self {
        Self {
            id_account: caller.id_account,
            id_user: caller.id_user,
            fields,
        }
    }
}

/// List filters; `None` means "do not filter on this"
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongFilters {
    pub category: Option<String>,
    pub artist: Option<String>,
    pub search_term: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongListRequest {
    pub id_account: i64,
    #[serde(flatten)]
    pub filters: SongFilters,
}

impl SongListRequest {
    pub fn new(caller: CallerIdentity, filters: SongFilters) -> Self {
        Self {
            id_account: caller.id_account,
            filters,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongGetRequest {
    pub id_account: i64,
    pub id_song: i64,
}

impl SongGetRequest {
    pub fn new(caller: CallerIdentity, id_song: i64) -> Self {
        Self {
            id_account: caller.id_account,
            id_song,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongUpdateRequest {
    pub id_account: i64,
    pub id_user: i64,
    pub id_song: i64,
    #[serde(flatten)]
    pub fields: SongFields,
}

impl SongUpdateRequest {
    pub fn new(caller: CallerIdentity, id_song: i64, fields: SongFields) -> Self {
        Self {
            id_account: caller.id_account,
            id_user: caller.id_user,
            id_song,
            fields,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDeleteRequest {
    pub id_account: i64,
    pub id_user: i64,
    pub id_song: i64,
}

impl SongDeleteRequest {
    pub fn new(caller: CallerIdentity, id_song: i64) -> Self {
        Self {
            id_account: caller.id_account,
            id_user: caller.id_user,
            id_song,
        }
    }
}

/// Create a song and return its new id
pub async fn create(gateway: &Gateway, request: &SongCreateRequest) -> DbResult<SongId> {
    let outcome = gateway
        .request(SP_SONG_CREATE, request, ExpectedReturn::Single, None)
        .await?;
    outcome.into_single()?.ok_or_else(|| missing_row(SP_SONG_CREATE))
}

/// Songs of the caller's account matching the filters
pub async fn list(gateway: &Gateway, request: &SongListRequest) -> DbResult<Vec<Song>> {
    gateway
        .request(SP_SONG_LIST, request, ExpectedReturn::Multi, None)
        .await?
        .into_first_set()
}

/// One song, or `None` if it does not exist in the caller's account
pub async fn get(gateway: &Gateway, request: &SongGetRequest) -> DbResult<Option<Song>> {
    gateway
        .request(SP_SONG_GET, request, ExpectedReturn::Single, None)
        .await?
        .into_single()
}

pub async fn update(gateway: &Gateway, request: &SongUpdateRequest) -> DbResult<SongId> {
    let outcome = gateway
        .request(SP_SONG_UPDATE, request, ExpectedReturn::Single, None)
        .await?;
    outcome.into_single()?.ok_or_else(|| missing_row(SP_SONG_UPDATE))
}

/// Soft-delete a song
pub async fn delete(gateway: &Gateway, request: &SongDeleteRequest) -> DbResult<SongId> {
    let outcome = gateway
        .request(SP_SONG_DELETE, request, ExpectedReturn::Single, None)
        .await?;
    outcome.into_single()?.ok_or_else(|| missing_row(SP_SONG_DELETE))
}

fn missing_row(procedure: &str) -> DbError {
    DbError::MissingRow {
        procedure: procedure.to_string(),
    }
}
