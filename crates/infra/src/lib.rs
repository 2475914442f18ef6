//! Infrastructure layer: entity store backends, dashboard query, config and DB bootstrap.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod store;

pub use config::{AllowedOrigins, ConfigError, DatabaseConfig, PortalConfig};
pub use dashboard::dashboard_stats;
pub use error::{StoreError, StoreResult};
pub use store::{InMemoryStore, PortalStore, PostgresStore, SharedStore, SoftDeletion};
