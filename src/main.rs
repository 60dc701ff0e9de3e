use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use chrg_core::constants::DEFAULT_CHARGE_ITEM_DATA_DIR;
use chrg_core::{CoreConfig, InProcessBackend};

/// Main entry point for the CHRG service
///
/// Resolves configuration once, then serves the REST API (with Swagger UI under
/// `/swagger-ui`) until the process is stopped.
///
/// # Environment Variables
/// - `CHRG_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CHARGE_ITEM_DATA_DIR`: Local charge-item cache root (default: "charge_item_data"),
///   created if absent
/// - `API_KEY`: API key for the backend-administration routes
/// - `RUST_LOG`: Log filter, on top of the default `chrg=info`
///
/// # Errors
/// Returns an error if:
/// - the logging configuration cannot be initialised,
/// - the data directory cannot be created or is not a directory,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("chrg=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CHRG_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = PathBuf::from(
        std::env::var("CHARGE_ITEM_DATA_DIR").unwrap_or_else(|_| DEFAULT_CHARGE_ITEM_DATA_DIR.into()),
    );
    let api_key = std::env::var("API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!("API_KEY not set; backend routes will refuse every request");
    }

    std::fs::create_dir_all(&data_dir)?;
    let cfg = Arc::new(CoreConfig::new(data_dir)?);
    tracing::info!(data_dir = %cfg.charge_item_data_dir().display(), "charge item cache ready");

    let app = router(AppState::new(InProcessBackend::new(cfg), api_key));

    tracing::info!("++ Starting CHRG REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
