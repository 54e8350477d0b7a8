use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::engine::ledger::award_points;
use crate::error::AppError;
use crate::models::pickup::{Location, PickupRequest, PickupStatus, TrashType};
use crate::models::user::{Role, User};
use crate::state::AppState;

pub const POINTS_PER_KG: u64 = 5;

#[derive(Debug, Deserialize)]
pub struct NewPickupRequest {
    pub trash_type: TrashType,
    pub weight_kg: f64,
    pub location: Location,
    pub photo_url: Option<String>,
    pub note: Option<String>,
}

/// Partial update applied through the lifecycle engine. Absent fields are
/// left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCommand {
    pub weight_kg: Option<f64>,
    pub status: Option<PickupStatus>,
    pub photo_url: Option<String>,
    pub note: Option<String>,
}

/// A pickup request with its referenced identities joined in, for
/// collector/admin listings.
#[derive(Debug, Clone, Serialize)]
pub struct PickupView {
    #[serde(flatten)]
    pub request: PickupRequest,
    pub submitted_by: Option<User>,
    pub collected_by: Option<User>,
}

/// The legal status edges. Matched exhaustively so a new status or role
/// forces a review of every rule here.
fn edge_allowed(current: PickupStatus, target: PickupStatus) -> bool {
    use PickupStatus::*;

    match (current, target) {
        (Requested, InProgress) | (Requested, Completed) | (Requested, Rejected) => true,
        (InProgress, Completed) | (InProgress, Rejected) => true,
        // Idempotent completion retry; handled as a no-op by the caller.
        (Completed, Completed) => true,
        (Requested, Requested)
        | (InProgress, Requested)
        | (InProgress, InProgress)
        | (Completed, Requested)
        | (Completed, InProgress)
        | (Completed, Rejected)
        | (Rejected, _) => false,
    }
}

pub fn points_for(weight_kg: f64) -> u64 {
    (weight_kg * POINTS_PER_KG as f64).round() as u64
}

fn validate_weight(weight_kg: f64) -> Result<(), AppError> {
    if !weight_kg.is_finite() || weight_kg < 0.0 {
        return Err(AppError::Validation(
            "weight_kg must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

/// Remembers the acting principal in the user table so listings can resolve
/// ids to identities. Never touches the point balance.
fn remember_principal(state: &AppState, principal: &Principal) {
    state
        .users
        .entry(principal.id)
        .and_modify(|user| user.role = principal.role)
        .or_insert_with(|| User {
            id: principal.id,
            role: principal.role,
            points: 0,
        });
}

pub fn create_request(
    state: &AppState,
    actor: &Principal,
    input: NewPickupRequest,
) -> Result<PickupRequest, AppError> {
    if actor.role != Role::Customer {
        return Err(AppError::Forbidden(
            "only customers may submit pickup requests".to_string(),
        ));
    }

    validate_weight(input.weight_kg)?;

    if input.location.address.trim().is_empty() {
        return Err(AppError::Validation("address cannot be empty".to_string()));
    }

    remember_principal(state, actor);

    let now = Utc::now();
    let request = PickupRequest {
        id: Uuid::new_v4(),
        submitting_user: actor.id,
        collector: None,
        status: PickupStatus::Requested,
        trash_type: input.trash_type,
        weight_kg: input.weight_kg,
        location: input.location,
        photo_url: input.photo_url,
        note: input.note,
        created_at: now,
        updated_at: now,
    };

    state.pickups.insert(request.id, request.clone());
    info!(request_id = %request.id, user_id = %actor.id, "pickup request created");

    Ok(request)
}

/// Applies a partial update to one request.
///
/// The read-modify-write runs under the record's map entry lock: the prior
/// status is read, compared, and overwritten while no other caller can touch
/// the record, which is what makes the completion award fire at most once.
/// The guard is dropped before the ledger credit is attempted.
pub async fn update_request(
    state: &AppState,
    actor: &Principal,
    id: Uuid,
    cmd: UpdateCommand,
) -> Result<PickupRequest, AppError> {
    if let Some(weight_kg) = cmd.weight_kg {
        validate_weight(weight_kg)?;
    }

    remember_principal(state, actor);

    let (updated, award) = {
        let mut entry = state
            .pickups
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("pickup request {id} not found")))?;
        let record = entry.value_mut();

        let is_owner = record.submitting_user == actor.id;
        let can_transition = actor.role.can_transition();

        if !is_owner && !can_transition {
            return Err(AppError::Forbidden(
                "not the submitting user and not a collector or admin".to_string(),
            ));
        }

        if cmd.status.is_some() && !can_transition {
            return Err(AppError::Forbidden(
                "only collectors and admins may change status".to_string(),
            ));
        }

        // Photo and note edits ride along for the owner at any status, but a
        // collector/admin only gets them bundled with a status change.
        if (cmd.photo_url.is_some() || cmd.note.is_some()) && !is_owner && cmd.status.is_none() {
            return Err(AppError::Forbidden(
                "photo and note edits by a collector or admin must accompany a status change"
                    .to_string(),
            ));
        }

        if cmd.weight_kg.is_some() {
            if !is_owner {
                return Err(AppError::Forbidden(
                    "only the submitting user may change weight".to_string(),
                ));
            }
            if record.status != PickupStatus::Requested {
                return Err(AppError::InvalidTransition(format!(
                    "weight is locked once status leaves {}; current status is {}",
                    PickupStatus::Requested,
                    record.status
                )));
            }
        }

        let mut award = None;
        if let Some(target) = cmd.status {
            let prior = record.status;

            if !edge_allowed(prior, target) {
                return Err(AppError::InvalidTransition(format!(
                    "cannot move from {prior} to {target}"
                )));
            }

            let was_completed = prior == PickupStatus::Completed;
            record.status = target;

            if matches!(target, PickupStatus::InProgress | PickupStatus::Completed)
                && record.collector.is_none()
            {
                record.collector = Some(actor.id);
            }

            if target == PickupStatus::Completed && !was_completed {
                award = Some((record.submitting_user, points_for(record.weight_kg)));
            }

            state
                .metrics
                .transitions_total
                .with_label_values(&[target.as_str()])
                .inc();
        }

        if let Some(weight_kg) = cmd.weight_kg {
            record.weight_kg = weight_kg;
        }
        if let Some(photo_url) = cmd.photo_url {
            record.photo_url = Some(photo_url);
        }
        if let Some(note) = cmd.note {
            record.note = Some(note);
        }
        record.updated_at = Utc::now();

        (record.clone(), award)
    };

    if let Some((user_id, amount)) = award {
        info!(
            request_id = %id,
            collector_id = %actor.id,
            amount,
            "pickup completed, crediting points"
        );
        award_points(state, id, user_id, amount).await;
    }

    Ok(updated)
}

pub fn get_request(state: &AppState, actor: &Principal, id: Uuid) -> Result<PickupView, AppError> {
    let request = state
        .pickups
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("pickup request {id} not found")))?;

    if request.submitting_user != actor.id && !actor.role.can_transition() {
        return Err(AppError::Forbidden(
            "not the submitting user and not a collector or admin".to_string(),
        ));
    }

    Ok(resolve(state, request))
}

pub fn list_mine(state: &AppState, actor: &Principal) -> Vec<PickupRequest> {
    let mut requests: Vec<PickupRequest> = state
        .pickups
        .iter()
        .filter(|entry| entry.value().submitting_user == actor.id)
        .map(|entry| entry.value().clone())
        .collect();

    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}

pub fn list_all(state: &AppState, actor: &Principal) -> Result<Vec<PickupView>, AppError> {
    if !actor.role.can_transition() {
        return Err(AppError::Forbidden(
            "only collectors and admins may list all pickup requests".to_string(),
        ));
    }

    let mut requests: Vec<PickupRequest> = state
        .pickups
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(requests
        .into_iter()
        .map(|request| resolve(state, request))
        .collect())
}

fn resolve(state: &AppState, request: PickupRequest) -> PickupView {
    let lookup = |id: Uuid| state.users.get(&id).map(|entry| entry.value().clone());

    let submitted_by = lookup(request.submitting_user);
    let collected_by = request.collector.and_then(lookup);

    PickupView {
        request,
        submitted_by,
        collected_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreditRetryPolicy;
    use crate::models::pickup::Location;

    fn customer() -> Principal {
        Principal {
            id: Uuid::from_u128(1),
            role: Role::Customer,
        }
    }

    fn collector() -> Principal {
        Principal {
            id: Uuid::from_u128(2),
            role: Role::Collector,
        }
    }

    fn second_collector() -> Principal {
        Principal {
            id: Uuid::from_u128(3),
            role: Role::Collector,
        }
    }

    fn new_request(weight_kg: f64) -> NewPickupRequest {
        NewPickupRequest {
            trash_type: TrashType::Organic,
            weight_kg,
            location: Location {
                latitude: -6.2,
                longitude: 106.8,
                address: "Jl. Merdeka 1".to_string(),
            },
            photo_url: None,
            note: None,
        }
    }

    fn status_change(target: PickupStatus) -> UpdateCommand {
        UpdateCommand {
            status: Some(target),
            ..UpdateCommand::default()
        }
    }

    fn state() -> AppState {
        AppState::new(CreditRetryPolicy::default())
    }

    fn points_of(state: &AppState, id: Uuid) -> u64 {
        state.users.get(&id).map(|u| u.points).unwrap_or(0)
    }

    #[test]
    fn edge_table_matches_lifecycle() {
        use PickupStatus::*;

        assert!(edge_allowed(Requested, InProgress));
        assert!(edge_allowed(Requested, Completed));
        assert!(edge_allowed(Requested, Rejected));
        assert!(edge_allowed(InProgress, Completed));
        assert!(edge_allowed(InProgress, Rejected));
        assert!(edge_allowed(Completed, Completed));

        assert!(!edge_allowed(Completed, InProgress));
        assert!(!edge_allowed(Completed, Requested));
        assert!(!edge_allowed(Completed, Rejected));
        assert!(!edge_allowed(Rejected, Requested));
        assert!(!edge_allowed(Rejected, InProgress));
        assert!(!edge_allowed(Rejected, Completed));
        assert!(!edge_allowed(Rejected, Rejected));
        assert!(!edge_allowed(InProgress, Requested));
        assert!(!edge_allowed(InProgress, InProgress));
        assert!(!edge_allowed(Requested, Requested));
    }

    #[test]
    fn create_requires_customer_role() {
        let state = state();
        let err = create_request(&state, &collector(), new_request(4.0));
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn create_rejects_negative_weight() {
        let state = state();
        let err = create_request(&state, &customer(), new_request(-1.0));
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn create_rejects_blank_address() {
        let state = state();
        let mut input = new_request(4.0);
        input.location.address = "  ".to_string();
        let err = create_request(&state, &customer(), input);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn completion_awards_points_once() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(10.0)).unwrap();

        let updated = update_request(&state, &worker, created.id, status_change(PickupStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(updated.status, PickupStatus::InProgress);
        assert_eq!(updated.collector, Some(worker.id));
        assert_eq!(points_of(&state, owner.id), 0);

        let updated = update_request(&state, &worker, created.id, status_change(PickupStatus::Completed))
            .await
            .unwrap();
        assert_eq!(updated.status, PickupStatus::Completed);
        assert_eq!(points_of(&state, owner.id), 50);

        // Completion retry stays a no-op for the balance.
        let updated = update_request(&state, &worker, created.id, status_change(PickupStatus::Completed))
            .await
            .unwrap();
        assert_eq!(updated.status, PickupStatus::Completed);
        assert_eq!(points_of(&state, owner.id), 50);
    }

    #[tokio::test]
    async fn completion_retry_still_applies_bundled_photo() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(2.0)).unwrap();

        update_request(&state, &worker, created.id, status_change(PickupStatus::Completed))
            .await
            .unwrap();

        let cmd = UpdateCommand {
            status: Some(PickupStatus::Completed),
            photo_url: Some("mem://photos/final.jpg".to_string()),
            ..UpdateCommand::default()
        };
        let updated = update_request(&state, &worker, created.id, cmd).await.unwrap();

        assert_eq!(updated.photo_url.as_deref(), Some("mem://photos/final.jpg"));
        assert_eq!(points_of(&state, owner.id), 10);
    }

    #[tokio::test]
    async fn owner_cannot_change_status() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        let err = update_request(&state, &owner, created.id, status_change(PickupStatus::Completed)).await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn owner_weight_edit_locked_after_requested() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        update_request(&state, &worker, created.id, status_change(PickupStatus::Completed))
            .await
            .unwrap();

        let cmd = UpdateCommand {
            weight_kg: Some(5.0),
            ..UpdateCommand::default()
        };
        let err = update_request(&state, &owner, created.id, cmd).await;
        assert!(matches!(err, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn owner_weight_edit_allowed_while_requested() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        let cmd = UpdateCommand {
            weight_kg: Some(7.5),
            ..UpdateCommand::default()
        };
        let updated = update_request(&state, &owner, created.id, cmd).await.unwrap();
        assert_eq!(updated.weight_kg, 7.5);
        assert_eq!(updated.status, PickupStatus::Requested);
    }

    #[tokio::test]
    async fn collector_cannot_change_weight() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        let cmd = UpdateCommand {
            weight_kg: Some(5.0),
            ..UpdateCommand::default()
        };
        let err = update_request(&state, &collector(), created.id, cmd).await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn stranger_cannot_touch_request() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        let stranger = Principal {
            id: Uuid::from_u128(99),
            role: Role::Customer,
        };
        let cmd = UpdateCommand {
            photo_url: Some("mem://photos/x.jpg".to_string()),
            ..UpdateCommand::default()
        };
        let err = update_request(&state, &stranger, created.id, cmd).await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn collector_photo_edit_requires_status_change() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        let cmd = UpdateCommand {
            photo_url: Some("mem://photos/x.jpg".to_string()),
            ..UpdateCommand::default()
        };
        let err = update_request(&state, &collector(), created.id, cmd).await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn owner_can_append_note_after_terminal_state() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        update_request(&state, &worker, created.id, status_change(PickupStatus::Rejected))
            .await
            .unwrap();

        let cmd = UpdateCommand {
            note: Some("please try again next week".to_string()),
            ..UpdateCommand::default()
        };
        let updated = update_request(&state, &owner, created.id, cmd).await.unwrap();
        assert_eq!(updated.status, PickupStatus::Rejected);
        assert_eq!(updated.note.as_deref(), Some("please try again next week"));
    }

    #[tokio::test]
    async fn first_collector_to_act_wins() {
        let state = state();
        let owner = customer();
        let first = collector();
        let second = second_collector();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        update_request(&state, &first, created.id, status_change(PickupStatus::InProgress))
            .await
            .unwrap();
        let updated = update_request(&state, &second, created.id, status_change(PickupStatus::Completed))
            .await
            .unwrap();

        assert_eq!(updated.collector, Some(first.id));
    }

    #[tokio::test]
    async fn collector_survives_rejection() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        update_request(&state, &worker, created.id, status_change(PickupStatus::InProgress))
            .await
            .unwrap();
        let updated = update_request(&state, &worker, created.id, status_change(PickupStatus::Rejected))
            .await
            .unwrap();

        assert_eq!(updated.status, PickupStatus::Rejected);
        assert_eq!(updated.collector, Some(worker.id));
        assert_eq!(points_of(&state, owner.id), 0);
    }

    #[tokio::test]
    async fn rejected_is_terminal() {
        let state = state();
        let owner = customer();
        let worker = collector();
        let created = create_request(&state, &owner, new_request(3.0)).unwrap();

        update_request(&state, &worker, created.id, status_change(PickupStatus::Rejected))
            .await
            .unwrap();
        let err = update_request(&state, &worker, created.id, status_change(PickupStatus::InProgress)).await;
        assert!(matches!(err, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let state = state();
        let err = update_request(
            &state,
            &collector(),
            Uuid::from_u128(12345),
            status_change(PickupStatus::InProgress),
        )
        .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[test]
    fn list_mine_is_newest_first_and_scoped() {
        let state = state();
        let owner = customer();
        let other = Principal {
            id: Uuid::from_u128(50),
            role: Role::Customer,
        };

        let first = create_request(&state, &owner, new_request(1.0)).unwrap();
        let second = create_request(&state, &owner, new_request(2.0)).unwrap();
        create_request(&state, &other, new_request(3.0)).unwrap();

        let mine = list_mine(&state, &owner);
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id);
        assert_eq!(mine[1].id, first.id);
    }

    #[test]
    fn list_all_requires_collector_or_admin() {
        let state = state();
        let err = list_all(&state, &customer());
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn get_resolves_submitting_user() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(1.0)).unwrap();

        let view = get_request(&state, &collector(), created.id).unwrap();
        assert_eq!(view.request.id, created.id);
        let submitted_by = view.submitted_by.unwrap();
        assert_eq!(submitted_by.id, owner.id);
        assert_eq!(submitted_by.role, Role::Customer);
    }

    #[test]
    fn get_denies_unrelated_customer() {
        let state = state();
        let owner = customer();
        let created = create_request(&state, &owner, new_request(1.0)).unwrap();

        let stranger = Principal {
            id: Uuid::from_u128(77),
            role: Role::Customer,
        };
        let err = get_request(&state, &stranger, created.id);
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }
}
