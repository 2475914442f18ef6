//! Postgres pool bootstrap and schema setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::error::StoreResult;
use crate::store::postgres::map_sqlx_error;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Open the pool and make sure the schema exists.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    apply_schema(&pool).await?;
    tracing::info!(max_connections = config.max_connections, "postgres pool ready");
    Ok(pool)
}

/// Apply the idempotent schema script.
pub async fn apply_schema(pool: &PgPool) -> StoreResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}
