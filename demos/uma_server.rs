use std::sync::Arc;

use lightspark_rs::server::uma::{router, UmaState};
use lightspark_rs::{Error, LightsparkClient, Requester, UmaServerConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = UmaServerConfig::from_env()?;
    let requester = Requester::with_base_url(
        config.api_client_id.clone(),
        config.api_client_secret.clone(),
        config.api_endpoint.clone(),
    )?;
    let client = Arc::new(LightsparkClient::with_requester(requester));
    let port = config.port;

    println!("UMA demo VASP");
    println!("=============");
    println!("Receiver: ${}", config.receiver_user);
    println!("Node: {}", config.node_id);
    println!();

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| Error::internal(format!("failed to bind port {}: {}", port, e)))?;
    tracing::info!("UMA server listening on port {}", port);

    axum::serve(listener, router(UmaState::new(client, config)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))
}
