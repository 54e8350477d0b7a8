use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, patch, post};
use uuid::Uuid;

use crate::auth::Principal;
use crate::engine::lifecycle::{
    self, NewPickupRequest, PickupView, UpdateCommand,
};
use crate::error::AppError;
use crate::models::pickup::PickupRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups", post(create_pickup).get(list_all_pickups))
        .route("/pickups/mine", get(list_my_pickups))
        .route("/pickups/:id", get(get_pickup).patch(update_pickup))
        .route("/pickups/:id/photo", post(attach_photo))
}

async fn create_pickup(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Json(payload): Json<NewPickupRequest>,
) -> Result<(StatusCode, Json<PickupRequest>), AppError> {
    let request = lifecycle::create_request(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_all_pickups(
    State(state): State<Arc<AppState>>,
    actor: Principal,
) -> Result<Json<Vec<PickupView>>, AppError> {
    let requests = lifecycle::list_all(&state, &actor)?;
    Ok(Json(requests))
}

async fn list_my_pickups(
    State(state): State<Arc<AppState>>,
    actor: Principal,
) -> Json<Vec<PickupRequest>> {
    Json(lifecycle::list_mine(&state, &actor))
}

async fn get_pickup(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<PickupView>, AppError> {
    let view = lifecycle::get_request(&state, &actor, id)?;
    Ok(Json(view))
}

async fn update_pickup(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCommand>,
) -> Result<Json<PickupRequest>, AppError> {
    let updated = lifecycle::update_request(&state, &actor, id, payload).await?;
    Ok(Json(updated))
}

/// Accepts a raw image body, hands it to blob storage, and applies the
/// resulting URL as a photo-only update. The lifecycle rules for photo
/// edits apply unchanged.
async fn attach_photo(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PickupRequest>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Validation("missing content-type header".to_string()))?;

    let suggested_name = format!("pickup-{id}");
    let url = state.blobs.store(&body, content_type, &suggested_name)?;

    let cmd = UpdateCommand {
        photo_url: Some(url),
        ..UpdateCommand::default()
    };
    let updated = lifecycle::update_request(&state, &actor, id, cmd).await?;

    Ok(Json(updated))
}
