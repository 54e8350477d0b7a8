use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::blob::{BlobStore, InMemoryBlobStore};
use crate::config::CreditRetryPolicy;
use crate::engine::ledger::{InMemoryLedger, PendingCredit, PointLedger};
use crate::models::pickup::PickupRequest;
use crate::models::tps::Tps;
use crate::models::user::User;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub pickups: DashMap<Uuid, PickupRequest>,
    pub users: Arc<DashMap<Uuid, User>>,
    pub tps: DashMap<String, Tps>,
    pub pending_credits: DashMap<Uuid, PendingCredit>,
    pub ledger: Arc<dyn PointLedger>,
    pub blobs: Arc<dyn BlobStore>,
    pub credit_retry: CreditRetryPolicy,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(credit_retry: CreditRetryPolicy) -> Self {
        let users = Arc::new(DashMap::new());
        let ledger = Arc::new(InMemoryLedger::new(users.clone()));
        Self::with_ledger(credit_retry, users, ledger)
    }

    /// Test seam: swap the ledger implementation while sharing the user
    /// table with the rest of the state.
    pub fn with_ledger(
        credit_retry: CreditRetryPolicy,
        users: Arc<DashMap<Uuid, User>>,
        ledger: Arc<dyn PointLedger>,
    ) -> Self {
        Self {
            pickups: DashMap::new(),
            users,
            tps: DashMap::new(),
            pending_credits: DashMap::new(),
            ledger,
            blobs: Arc::new(InMemoryBlobStore::new()),
            credit_retry,
            metrics: Metrics::new(),
        }
    }
}
