use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use url::Url;

use super::ApiError;
use crate::client_trait::LightsparkApi;
use crate::config::UmaServerConfig;
use crate::error::Error;
use crate::uma::address::scheme_for_domain;
use crate::uma::{InMemoryNonceCache, InMemoryPublicKeyCache, UnsupportedVersionResponse};
use crate::vasp::{PayReqParams, UmaReceiver, UmaSender};

/// Shared state of the UMA demo VASP: one sender and one receiver over the
/// same key and nonce caches.
#[derive(Clone)]
pub struct UmaState {
    config: Arc<UmaServerConfig>,
    sender: Arc<UmaSender>,
    receiver: Arc<UmaReceiver>,
}

impl UmaState {
    pub fn new(client: Arc<dyn LightsparkApi>, config: UmaServerConfig) -> Self {
        let config = Arc::new(config);
        let public_keys = Arc::new(InMemoryPublicKeyCache::new());
        let nonces = Arc::new(InMemoryNonceCache::default());
        let sender = UmaSender::new(
            client.clone(),
            config.clone(),
            public_keys.clone(),
            nonces.clone(),
        );
        let receiver = UmaReceiver::new(client, config.clone(), public_keys, nonces);
        Self::from_parts(config, sender, receiver)
    }

    /// Builds the state from preconfigured roles, e.g. with a custom poll
    /// schedule or version set.
    pub fn from_parts(config: Arc<UmaServerConfig>, sender: UmaSender, receiver: UmaReceiver) -> Self {
        Self {
            config,
            sender: Arc::new(sender),
            receiver: Arc::new(receiver),
        }
    }

    pub fn sender(&self) -> &UmaSender {
        &self.sender
    }

    pub fn receiver(&self) -> &UmaReceiver {
        &self.receiver
    }

    fn vasp_domain(&self, headers: &HeaderMap) -> String {
        self.config.vasp_domain(request_host(headers))
    }
}

pub fn router(state: UmaState) -> Router {
    Router::new()
        .route("/api/umalookup/:receiver", get(lookup))
        .route("/api/umapayreq/:callback_uuid", get(pay_request))
        .route("/api/sendpayment/:callback_uuid", post(send_payment))
        .route("/.well-known/lnurlp/:username", get(lnurlp))
        .route(
            "/api/uma/payreq/:uuid",
            get(lnurl_pay_request).post(uma_pay_request),
        )
        .route("/.well-known/lnurlpubkey", get(pubkey))
        .route("/api/uma/utxocallback", post(utxo_callback))
        .with_state(state)
}

fn request_host(headers: &HeaderMap) -> &str {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost")
}

async fn lookup(
    State(state): State<UmaState>,
    Path(receiver): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let result = state
        .sender
        .handle_lookup(&receiver, &state.vasp_domain(&headers))
        .await?;
    Ok(Json(result).into_response())
}

async fn pay_request(
    State(state): State<UmaState>,
    Path(callback_uuid): Path<String>,
    headers: HeaderMap,
    Query(params): Query<PayReqParams>,
) -> Result<Response, ApiError> {
    let result = state
        .sender
        .handle_pay_request(&callback_uuid, &params, &state.vasp_domain(&headers))
        .await?;
    Ok(Json(result).into_response())
}

async fn send_payment(
    State(state): State<UmaState>,
    Path(callback_uuid): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let result = state
        .sender
        .handle_send_payment(&callback_uuid, &state.vasp_domain(&headers))
        .await?;
    Ok(Json(result).into_response())
}

async fn lnurlp(
    State(state): State<UmaState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let host = request_host(&headers);
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = Url::parse(&format!(
        "{}://{}{}",
        scheme_for_domain(host),
        host,
        path_and_query
    ))
    .map_err(Error::from)?;

    match state
        .receiver
        .handle_lnurlp(&username, &url, &state.vasp_domain(&headers))
        .await
    {
        Ok(response) => Ok(Json(response).into_response()),
        Err(Error::UnsupportedVersion(version)) => {
            tracing::warn!("Rejecting lnurlp request with UMA version {}", version);
            let body = UnsupportedVersionResponse::new(version, state.receiver.versions());
            Ok((StatusCode::PRECONDITION_FAILED, Json(body)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct AmountQuery {
    amount: Option<String>,
}

async fn lnurl_pay_request(
    State(state): State<UmaState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AmountQuery>,
) -> Result<Response, ApiError> {
    let amount_msats = query
        .amount
        .as_deref()
        .and_then(|amount| amount.parse::<i64>().ok())
        .ok_or_else(|| Error::invalid_input("Invalid amount"))?;
    let response = state
        .receiver
        .handle_lnurl_pay_request(&uuid, amount_msats, &state.vasp_domain(&headers))
        .await?;
    Ok(Json(response).into_response())
}

async fn uma_pay_request(
    State(state): State<UmaState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let response = state
        .receiver
        .handle_pay_request(&uuid, &body, &state.vasp_domain(&headers))
        .await?;
    Ok(Json(response).into_response())
}

async fn pubkey(State(state): State<UmaState>) -> Json<crate::uma::PubKeyResponse> {
    Json(state.receiver.public_keys())
}

#[derive(Debug, Deserialize)]
struct TxidQuery {
    txid: Option<String>,
}

async fn utxo_callback(
    State(state): State<UmaState>,
    Query(query): Query<TxidQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state
        .receiver
        .handle_utxo_callback(query.txid.as_deref(), &body)
        .await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{UmaServerConfig, DEFAULT_RECEIVER_USER_ID};
    use crate::crypto::Network;
    use crate::mock_client::MockLightsparkClient;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    const SIGNING_PRIVKEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const SIGNING_PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn config() -> UmaServerConfig {
        UmaServerConfig {
            api_client_id: "client-id".to_string(),
            api_client_secret: SecretString::new("client-secret".to_string()),
            api_endpoint: None,
            node_id: "LightsparkNodeWithOSKLND:1".to_string(),
            receiver_user: "alice".to_string(),
            receiver_user_id: DEFAULT_RECEIVER_USER_ID.to_string(),
            signing_pubkey_hex: SIGNING_PUBKEY.to_string(),
            signing_privkey_hex: SecretString::new(SIGNING_PRIVKEY.to_string()),
            encryption_pubkey_hex: SIGNING_PUBKEY.to_string(),
            encryption_privkey_hex: SecretString::new(SIGNING_PRIVKEY.to_string()),
            remote_signing_master_seed: None,
            osk_signing_key_password: None,
            bitcoin_network: Network::Regtest,
            vasp_domain: Some("vasp.local".to_string()),
            port: 8080,
        }
    }

    fn app() -> Router {
        router(UmaState::new(Arc::new(MockLightsparkClient::new()), config()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::HOST, "vasp.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_pubkey_endpoint() {
        let (status, body) = get_json(app(), "/.well-known/lnurlpubkey").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["signingPubKey"], SIGNING_PUBKEY);
        assert_eq!(body["encryptionPubKey"], SIGNING_PUBKEY);
        assert!(body["expirationTimestamp"].as_i64().is_some());
    }

    #[tokio::test]
    async fn test_plain_lnurlp_response() {
        let (status, body) = get_json(app(), "/.well-known/lnurlp/alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tag"], "payRequest");
        assert_eq!(
            body["callback"],
            format!("http://vasp.local/api/uma/payreq/{}", DEFAULT_RECEIVER_USER_ID)
        );
        assert!(body.get("compliance").map_or(true, Value::is_null));
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let (status, body) = get_json(app(), "/.well-known/lnurlp/bob").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "ERROR");
    }

    #[tokio::test]
    async fn test_unsupported_version_is_precondition_failed() {
        let (status, body) = get_json(
            app(),
            "/.well-known/lnurlp/alice?signature=00&vaspDomain=sender.local&nonce=1&isSubjectToTravelRule=true&timestamp=1700000000&umaVersion=2.0",
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["unsupportedVersion"], "2.0");
        assert_eq!(body["supportedMajorVersions"], "0,1");
    }

    #[tokio::test]
    async fn test_unknown_callback_uuid() {
        let (status, _) = get_json(app(), "/api/umapayreq/not-a-uuid?amount=100").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sendpayment/not-a-uuid")
                    .header(header::HOST, "vasp.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_utxo_callback_requires_txid() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/uma/utxocallback")
                    .body(Body::from(r#"{"utxos":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/uma/utxocallback?txid=1234")
                    .body(Body::from(r#"{"utxos":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
