use std::sync::Arc;

use anyhow::Context;

use govportal_infra::PortalConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    govportal_observability::init();

    let config = PortalConfig::from_env().context("invalid configuration")?;
    let services = govportal_api::app::services::build_services(&config)
        .await
        .context("failed to initialise store")?;
    let cors = govportal_api::middleware::cors_layer(&config.allowed_origins)
        .context("invalid CORS_ALLOWED_ORIGINS")?;
    let app = govportal_api::app::build_app(Arc::new(services), cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
