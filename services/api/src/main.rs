use anyhow::Result;
use api::{
    config::ApiConfig,
    routes,
    state::AppState,
    validation::ValidationGateway,
};
use common::storage::{StorageConfig, init_root};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    let config = ApiConfig::from_env()?;
    let gateway = ValidationGateway::new(config.mode()?);

    // A sessions directory that cannot be written is fatal
    init_root(&StorageConfig::new(config.sessions_dir.clone())).await?;

    let port = config.port;
    let app = routes::create_router(AppState::new(config, gateway));

    info!("Validation mode: {}", gateway.mode());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("API service listening on 0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
