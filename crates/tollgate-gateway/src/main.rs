//! Tollgate HTTP gateway binary.

use std::net::SocketAddr;

use clap::Parser;
use tollgate_gateway::{create_router, AppState, Args, GatewayConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tollgate_gateway=info,tollgate_core=info,tower_http=info".into()
            }),
        )
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::try_from(&args)?;

    info!(
        listen = %config.listen_addr,
        token_lifetime_secs = config.access.token.lifetime.as_secs(),
        previous_keys = config.access.token.previous_secrets.len(),
        "Starting Tollgate gateway"
    );
    if config.ephemeral_secret {
        warn!("no signing secret configured; tokens will not survive a restart");
    }

    // Create application state
    let state = AppState::new(config.clone())?;
    state.bootstrap_admin().await?;

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
