//! Song endpoints
//!
//! `GET/POST /song`, `GET/PUT/DELETE /song/:id`, nested under the internal
//! API base path. Each handler validates through the gate, calls one entity
//! operation and wraps the result in the success envelope.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use cifra_common::db::{Song, SongId};
use cifra_common::validation::{Fields, Schema, NAME_MAX};

use crate::api::middleware::route_not_found;
use crate::crud::{CrudController, RawRequest};
use crate::envelope::{self, Envelope};
use crate::error::{ApiError, ApiResult};
use crate::services::song::{
    self as songs, SongCreateRequest, SongDeleteRequest, SongFields, SongFilters, SongGetRequest,
    SongListRequest, SongUpdateRequest,
};
use crate::AppState;

/// Securable name used by the validation gate
pub const SECURABLE: &str = "SONG";

pub const LYRICS_MAX: usize = 5000;
pub const ORIGINAL_KEY_MAX: usize = 10;
pub const CATEGORY_MAX: usize = 50;

impl Schema for SongFields {
    fn parse(fields: &mut Fields<'_>) -> Self {
        SongFields {
            title: fields.name("title"),
            artist: fields.name("artist"),
            lyrics: fields.string("lyrics", 1, LYRICS_MAX),
            original_key: fields.nullable_string("originalKey", Some(ORIGINAL_KEY_MAX)),
            category: fields.nullable_string("category", Some(CATEGORY_MAX)),
        }
    }
}

impl Schema for SongFilters {
    fn parse(fields: &mut Fields<'_>) -> Self {
        SongFilters {
            category: non_empty(fields.nullable_string("category", Some(CATEGORY_MAX))),
            artist: non_empty(fields.nullable_string("artist", Some(NAME_MAX))),
            search_term: non_empty(fields.nullable_string("searchTerm", Some(NAME_MAX))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// `:id` path parameter
#[derive(Debug, Clone, Copy)]
pub struct SongIdParams {
    pub id: i64,
}

impl Schema for SongIdParams {
    fn parse(fields: &mut Fields<'_>) -> Self {
        SongIdParams {
            id: fields.foreign_key("id"),
        }
    }
}

/// `:id` path parameter plus the full song body
#[derive(Debug, Clone)]
pub struct SongUpdateParams {
    pub id: i64,
    pub fields: SongFields,
}

impl Schema for SongUpdateParams {
    fn parse(fields: &mut Fields<'_>) -> Self {
        SongUpdateParams {
            id: fields.foreign_key("id"),
            fields: SongFields::parse(fields),
        }
    }
}

fn controller(state: &AppState) -> CrudController {
    CrudController::new(SECURABLE, state.identity.clone())
}

/// GET /song
pub async fn list_songs(
    State(state): State<AppState>,
    raw: RawRequest,
) -> ApiResult<Json<Envelope<Vec<Song>>>> {
    let op = controller(&state).read::<SongFilters>(&raw)?;
    let request = SongListRequest::new(op.credential, op.params);
    let found = songs::list(&state.gateway, &request).await?;
    Ok(envelope::success(found))
}

/// POST /song
pub async fn create_song(
    State(state): State<AppState>,
    raw: RawRequest,
) -> ApiResult<(StatusCode, Json<Envelope<SongId>>)> {
    let op = controller(&state).create::<SongFields>(&raw)?;
    let request = SongCreateRequest::new(op.credential, op.params);
    let created = songs::create(&state.gateway, &request).await?;
    Ok((StatusCode::CREATED, envelope::success(created)))
}

/// GET /song/:id
pub async fn get_song(
    State(state): State<AppState>,
    raw: RawRequest,
) -> ApiResult<Json<Envelope<Song>>> {
    let op = controller(&state).read::<SongIdParams>(&raw)?;
    let request = SongGetRequest::new(op.credential, op.params.id);
    let song = songs::get(&state.gateway, &request)
        .await?
        .ok_or_else(|| ApiError::NotFound("Song not found".to_string()))?;
    Ok(envelope::success(song))
}

/// PUT /song/:id
pub async fn update_song(
    State(state): State<AppState>,
    raw: RawRequest,
) -> ApiResult<Json<Envelope<SongId>>> {
    let op = controller(&state).update::<SongUpdateParams>(&raw)?;
    let request = SongUpdateRequest::new(op.credential, op.params.id, op.params.fields);
    let updated = songs::update(&state.gateway, &request).await?;
    Ok(envelope::success(updated))
}

/// DELETE /song/:id (soft delete)
pub async fn delete_song(
    State(state): State<AppState>,
    raw: RawRequest,
) -> ApiResult<Json<Envelope<SongId>>> {
    let op = controller(&state).delete::<SongIdParams>(&raw)?;
    let request = SongDeleteRequest::new(op.credential, op.params.id);
    let deleted = songs::delete(&state.gateway, &request).await?;
    Ok(envelope::success(deleted))
}

/// Build song routes
///
/// Methods a path does not support fall through to the not-found envelope.
pub fn song_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/song",
            get(list_songs).post(create_song).fallback(route_not_found),
        )
        .route(
            "/song/:id",
            get(get_song)
                .put(update_song)
                .delete(delete_song)
                .fallback(route_not_found),
        )
}
