use std::net::SocketAddr;

use tracing::info;

mod agent_factory;
mod app;
mod collaborators;
mod error;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hub_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("HUB_CONFIG").ok();
    let config = hub_core::config::HubConfig::load(config_path.as_deref())?;

    let (state, shutdown_rx) = app::AppState::build(config)?;
    let router = app::build_router(state.clone());

    let bind = std::env::var("HUB_GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    info!("hub gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let worker = state.transcribe.clone();
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await?;

    worker_handle.abort();
    Ok(())
}
