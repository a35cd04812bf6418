// Binary Prediction Market Handler - Main Entry Point

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use market_handler::{build_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_handler=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let bind_addr = config.bind_addr;

    let state = AppState::new(config).shared();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %bind_addr, "market handler listening");
    info!("   POST /markets                          - Create market");
    info!("   GET  /markets/:id                      - Market snapshot");
    info!("   POST /markets/:id/buy|sell|swap        - Trade");
    info!("   POST /markets/:id/resolve              - Resolve (owner or oracle)");
    info!("   POST /markets/:id/refunds              - Retry a stranded refund");
    info!("   POST /markets/:id/rewards              - Collect winner's share");
    info!("   POST /currency/mint|approve            - Reference currency");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    info!("market handler stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
