//! Store selection and shared application state.

use std::sync::Arc;

use govportal_infra::{
    PortalConfig, SharedStore, StoreResult, db, dashboard_stats, InMemoryStore, PostgresStore,
};
use govportal_core::DashboardStats;

/// Handles shared by every request handler.
pub struct AppServices {
    pub store: SharedStore,
}

impl AppServices {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Services backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub async fn dashboard(&self) -> StoreResult<DashboardStats> {
        dashboard_stats(self.store.as_ref()).await
    }
}

/// Postgres when `DATABASE_URL` is configured, otherwise the in-memory store.
pub async fn build_services(config: &PortalConfig) -> StoreResult<AppServices> {
    match &config.database {
        Some(database) => {
            let pool = db::connect(database).await?;
            tracing::info!("using postgres store");
            Ok(AppServices::new(Arc::new(PostgresStore::new(pool))))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Ok(AppServices::in_memory())
        }
    }
}
