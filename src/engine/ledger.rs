use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Loyalty-point accessor. `credit` must be safe to retry for the same
/// logical award: a failed call leaves the balance untouched.
pub trait PointLedger: Send + Sync {
    fn credit(&self, user_id: Uuid, amount: u64) -> Result<u64, LedgerError>;
}

/// Ledger backed by the shared user table. Balance updates happen under the
/// per-user entry lock.
pub struct InMemoryLedger {
    users: Arc<DashMap<Uuid, User>>,
}

impl InMemoryLedger {
    pub fn new(users: Arc<DashMap<Uuid, User>>) -> Self {
        Self { users }
    }
}

impl PointLedger for InMemoryLedger {
    fn credit(&self, user_id: Uuid, amount: u64) -> Result<u64, LedgerError> {
        let mut user = self.users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            role: Role::Customer,
            points: 0,
        });

        user.points = user.points.saturating_add(amount);
        Ok(user.points)
    }
}

/// A completion award whose ledger credit has not landed yet. Keyed by
/// request id, which doubles as the idempotency key for re-drives.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCredit {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub amount: u64,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Credits `amount` points to `user_id` for the completion of `request_id`.
///
/// The marker goes in before the first attempt and is only removed once the
/// credit lands, so a failure at any point leaves an inspectable record.
/// The marker is also the claim on the credit: each attempt removes it
/// before touching the ledger and re-inserts it on failure. Whoever wins
/// the removal (this loop or the operator re-drive) performs the credit,
/// so the award cannot land twice. The caller's status write is never
/// rolled back; exhausted retries leave the marker for operator
/// remediation.
pub async fn award_points(state: &AppState, request_id: Uuid, user_id: Uuid, amount: u64) {
    state.pending_credits.insert(
        request_id,
        PendingCredit {
            request_id,
            user_id,
            amount,
            attempts: 0,
            recorded_at: Utc::now(),
        },
    );
    state.metrics.pending_credits.inc();

    let policy = state.credit_retry;
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.attempts.max(1) {
        // A missing marker means a re-drive settled the award during our
        // backoff sleep; it also took care of the metrics.
        let Some((_, mut pending)) = state.pending_credits.remove(&request_id) else {
            info!(request_id = %request_id, "pending credit already settled elsewhere");
            return;
        };

        match state.ledger.credit(user_id, amount) {
            Ok(balance) => {
                state.metrics.pending_credits.dec();
                state.metrics.points_awarded_total.inc_by(amount);
                info!(
                    request_id = %request_id,
                    user_id = %user_id,
                    amount,
                    balance,
                    "points credited"
                );
                return;
            }
            Err(err) => {
                state.metrics.credit_failures_total.inc();
                pending.attempts = attempt;
                state.pending_credits.insert(request_id, pending);
                warn!(
                    request_id = %request_id,
                    attempt,
                    error = %err,
                    "point credit attempt failed"
                );

                if attempt < policy.attempts {
                    sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    error!(
        request_id = %request_id,
        user_id = %user_id,
        amount,
        "point credit failed after {} attempts; left pending for operator remediation",
        policy.attempts
    );
}

/// Single re-drive of a pending credit, used by the operator endpoint.
///
/// Claims the marker by removing it before crediting, so this path and the
/// inline retry loop cannot both perform the same award.
pub fn retry_pending_credit(state: &AppState, request_id: Uuid) -> Result<PendingCredit, AppError> {
    let (_, pending) = state
        .pending_credits
        .remove(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no pending credit for request {request_id}")))?;

    match state.ledger.credit(pending.user_id, pending.amount) {
        Ok(balance) => {
            state.metrics.pending_credits.dec();
            state.metrics.points_awarded_total.inc_by(pending.amount);
            info!(
                request_id = %request_id,
                user_id = %pending.user_id,
                amount = pending.amount,
                balance,
                "pending credit re-driven"
            );
            Ok(pending)
        }
        Err(err) => {
            // Put the claim back so the award stays owed and visible.
            state.pending_credits.insert(request_id, pending);
            Err(AppError::Internal(err.to_string()))
        }
    }
}
