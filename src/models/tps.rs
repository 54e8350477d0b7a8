use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered waste-collection point. Reference data only; pickup
/// lifecycle never touches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tps {
    pub code: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub contact_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
