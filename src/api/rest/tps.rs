use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::Principal;
use crate::error::AppError;
use crate::models::tps::Tps;
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tps", post(create_tps).get(list_tps))
        .route("/tps/:code", get(get_tps).put(update_tps))
}

#[derive(Deserialize)]
pub struct TpsPayload {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub contact_info: String,
}

fn require_admin(actor: &Principal) -> Result<(), AppError> {
    if actor.role != Role::Admin {
        return Err(AppError::Forbidden(
            "only admins may manage the TPS directory".to_string(),
        ));
    }
    Ok(())
}

fn validate(payload: &TpsPayload) -> Result<(), AppError> {
    for (field, value) in [
        ("name", &payload.name),
        ("address", &payload.address),
        ("contact_info", &payload.contact_info),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} cannot be empty")));
        }
    }
    Ok(())
}

/// Codes run TPS001, TPS002, ... continuing from the highest suffix already
/// registered.
fn next_code(state: &AppState) -> String {
    let highest = state
        .tps
        .iter()
        .filter_map(|entry| {
            entry
                .key()
                .strip_prefix("TPS")
                .and_then(|suffix| suffix.parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0);

    format!("TPS{:03}", highest + 1)
}

async fn create_tps(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Json(payload): Json<TpsPayload>,
) -> Result<(StatusCode, Json<Tps>), AppError> {
    require_admin(&actor)?;
    validate(&payload)?;

    let tps = Tps {
        code: next_code(&state),
        name: payload.name,
        address: payload.address,
        latitude: payload.latitude,
        longitude: payload.longitude,
        contact_info: payload.contact_info,
        created_at: Utc::now(),
        updated_at: None,
    };

    state.tps.insert(tps.code.clone(), tps.clone());
    Ok((StatusCode::CREATED, Json(tps)))
}

async fn list_tps(State(state): State<Arc<AppState>>, _actor: Principal) -> Json<Vec<Tps>> {
    let mut all: Vec<Tps> = state.tps.iter().map(|entry| entry.value().clone()).collect();
    all.sort_by(|a, b| a.code.cmp(&b.code));
    Json(all)
}

async fn get_tps(
    State(state): State<Arc<AppState>>,
    _actor: Principal,
    Path(code): Path<String>,
) -> Result<Json<Tps>, AppError> {
    let tps = state
        .tps
        .get(&code)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("tps {code} not found")))?;

    Ok(Json(tps))
}

async fn update_tps(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Path(code): Path<String>,
    Json(payload): Json<TpsPayload>,
) -> Result<Json<Tps>, AppError> {
    require_admin(&actor)?;
    validate(&payload)?;

    let mut tps = state
        .tps
        .get_mut(&code)
        .ok_or_else(|| AppError::NotFound(format!("tps {code} not found")))?;

    tps.name = payload.name;
    tps.address = payload.address;
    tps.latitude = payload.latitude;
    tps.longitude = payload.longitude;
    tps.contact_info = payload.contact_info;
    tps.updated_at = Some(Utc::now());

    Ok(Json(tps.clone()))
}
