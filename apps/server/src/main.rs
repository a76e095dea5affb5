use std::sync::Arc;

use rosterhub_server::{api::app_router, build_state, config::Config, init_tracing, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;
    let router = app_router(state.clone(), &config);
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

/// Waits for Ctrl-C, then closes push connections so their response
/// streams end and the server can drain.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    let closed = state.dispatcher.close_all();
    tracing::info!("Shutting down; closed {} push connection(s)", closed);
}
