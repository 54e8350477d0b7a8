use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashType {
    Organic,
    Inorganic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Requested,
    InProgress,
    Completed,
    Rejected,
}

impl PickupStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PickupStatus::Completed | PickupStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PickupStatus::Requested => "requested",
            PickupStatus::InProgress => "in_progress",
            PickupStatus::Completed => "completed",
            PickupStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A household pickup request. `collector` is set exactly when the record
/// first enters `in_progress` or `completed` and is never cleared or
/// overwritten afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupRequest {
    pub id: Uuid,
    pub submitting_user: Uuid,
    pub collector: Option<Uuid>,
    pub status: PickupStatus,
    pub trash_type: TrashType,
    pub weight_kg: f64,
    pub location: Location,
    pub photo_url: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
