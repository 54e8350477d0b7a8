use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use uuid::Uuid;

use crate::auth::Principal;
use crate::engine::ledger::{self, PendingCredit};
use crate::error::AppError;
use crate::models::user::Role;
use crate::state::AppState;

/// Operator surface for completion awards whose ledger credit has not
/// landed. A pending entry means a pickup reported success while its
/// points are still owed.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/credits/pending", get(list_pending))
        .route("/credits/pending/:request_id/retry", post(retry_pending))
}

fn require_admin(actor: &Principal) -> Result<(), AppError> {
    if actor.role != Role::Admin {
        return Err(AppError::Forbidden(
            "only admins may inspect pending credits".to_string(),
        ));
    }
    Ok(())
}

async fn list_pending(
    State(state): State<Arc<AppState>>,
    actor: Principal,
) -> Result<Json<Vec<PendingCredit>>, AppError> {
    require_admin(&actor)?;

    let mut pending: Vec<PendingCredit> = state
        .pending_credits
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    pending.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));

    Ok(Json(pending))
}

async fn retry_pending(
    State(state): State<Arc<AppState>>,
    actor: Principal,
    Path(request_id): Path<Uuid>,
) -> Result<Json<PendingCredit>, AppError> {
    require_admin(&actor)?;

    let settled = ledger::retry_pending_credit(&state, request_id)?;
    Ok(Json(settled))
}
