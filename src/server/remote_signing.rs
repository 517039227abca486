use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};

use super::{error_response, ApiError};
use crate::client_trait::LightsparkApi;
use crate::error::Error;
use crate::remote_signing::RemoteSigningEngine;
use crate::webhooks::{self, WebhookEventType, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct RemoteSigningState {
    engine: Arc<RemoteSigningEngine>,
    client: Arc<dyn LightsparkApi>,
    webhook_secret: SecretString,
    respond_directly: bool,
}

impl RemoteSigningState {
    pub fn new(
        engine: RemoteSigningEngine,
        client: Arc<dyn LightsparkApi>,
        webhook_secret: SecretString,
        respond_directly: bool,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            client,
            webhook_secret,
            respond_directly,
        }
    }
}

pub fn router(state: RemoteSigningState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/ln/webhooks", post(webhook))
        .with_state(state)
}

async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn webhook(
    State(state): State<RemoteSigningState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::invalid_input("missing webhook signature"))?;
    let event = webhooks::verify_and_parse(&body, signature, state.webhook_secret.expose_secret())?;

    if state.respond_directly {
        if event.event_type != WebhookEventType::RemoteSigning {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        return Ok(match state.engine.signing_response(&event) {
            Ok(Some(response)) => Json(response.graphql_response().variables).into_response(),
            Ok(None) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
        });
    }

    Ok(match state.engine.handle(state.client.as_ref(), &event).await {
        Ok(outcome) => {
            tracing::info!("Webhook {}: {}", event.event_id, outcome);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    })
}
