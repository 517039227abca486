use std::sync::Arc;

use lightspark_rs::remote_signing::{HashValidator, PositiveValidator, RemoteSigningEngine};
use lightspark_rs::server::remote_signing::{router, RemoteSigningState};
use lightspark_rs::{Error, LightsparkClient, RemoteSigningServerConfig, Requester};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RemoteSigningServerConfig::from_env()?;
    let requester = Requester::with_base_url(
        config.api_client_id.clone(),
        config.api_client_secret.clone(),
        config.api_endpoint.clone(),
    )?;
    let client = Arc::new(LightsparkClient::with_requester(requester));

    let engine = if config.validation_enabled {
        RemoteSigningEngine::new(config.master_seed.clone(), HashValidator)
    } else {
        RemoteSigningEngine::new(config.master_seed.clone(), PositiveValidator)
    };
    let state = RemoteSigningState::new(
        engine,
        client,
        config.webhook_secret.clone(),
        config.respond_directly,
    );

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| Error::internal(format!("failed to bind port {}: {}", config.port, e)))?;
    tracing::info!("Remote signing server listening on port {}", config.port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))
}
