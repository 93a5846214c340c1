use actix_web::{web, App, HttpServer};
use adwatch_server::{configure, AppState, Settings};
use anyhow::Context;
use dotenv::dotenv;
use std::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new().context("failed to load configuration")?;
    info!(
        "Configuration loaded ({} environment, {:?} storage)",
        config.environment, config.database.backend
    );

    // Initialize application state
    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;

    // Periodic sweep of stale sessions and daily counters
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(state.sweeper().run(shutdown_rx));

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .with_context(|| format!("failed to bind {}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let app_state = web::Data::new(state.clone());
    HttpServer::new(move || App::new().app_data(app_state.clone()).configure(configure))
        .listen(listener)?
        .workers(config.server.workers as usize)
        .run()
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped, shutting down background tasks");
    if shutdown_tx.send(true).is_err() {
        warn!("Sweeper already stopped");
    }
    sweeper.await.context("sweeper task panicked")?;
    state.shutdown().await?;

    Ok(())
}
