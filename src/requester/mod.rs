//! # GraphQL requester
//!
//! Authenticated transport to the hosted-service GraphQL endpoint. Every call
//! posts a JSON envelope `{operationName, query, variables, nonce, expires_at}`
//! with HTTP Basic auth. When a [`SigningKey`] is supplied the exact envelope
//! bytes are signed and the signature travels in `X-Lightspark-Signing`.
//!
//! Unsigned operations are retried with exponential backoff on transient
//! failures, per [`RetryConfig`]. Signed operations are sent once.

pub mod signing_key;

use std::time::Duration as StdDuration;

use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio_retry::RetryIf;
use url::Url;

use crate::config::RetryConfig;
use crate::error::Error;

pub use signing_key::SigningKey;

pub const DEFAULT_BASE_URL: &str = "https://api.lightspark.com/graphql/server/2023-09-13";
pub const OPERATION_HEADER: &str = "X-GraphQL-Operation";
pub const SIGNING_HEADER: &str = "X-Lightspark-Signing";
pub const SDK_HEADER: &str = "X-Lightspark-SDK";

static OPERATION_NAME: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:query|mutation)\s+(\w+)"));

/// SDK identifier sent as `User-Agent` and `X-Lightspark-SDK`.
pub fn user_agent() -> String {
    format!("lightspark-rust-sdk/{} rust", env!("CARGO_PKG_VERSION"))
}

/// Extracts the operation name following the leading `query` or `mutation` keyword.
pub fn operation_name(query: &str) -> Result<String, Error> {
    let regex = OPERATION_NAME
        .as_ref()
        .map_err(|e| Error::internal(e.to_string()))?;
    regex
        .captures(query)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .ok_or_else(|| Error::InvalidQuery("invalid query payload".to_string()))
}

/// Rejects plain-http base URLs unless they point at a local development host.
pub fn validate_base_url(base_url: &str) -> Result<(), Error> {
    let url = Url::parse(base_url)
        .map_err(|_| Error::InvalidBaseUrl("Not a valid URL".to_string()))?;
    let host = url.host_str().unwrap_or_default();
    let tld = host.rsplit('.').next().unwrap_or_default();
    let is_local =
        host == "localhost" || host == "127.0.0.1" || tld == "local" || tld == "internal";
    if url.scheme() != "https" && !is_local {
        return Err(Error::InvalidBaseUrl(
            "Must be https:// if not targeting localhost".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Requester {
    client: Client,
    api_client_id: String,
    api_client_secret: SecretString,
    base_url: String,
    retry: RetryConfig,
}

impl Requester {
    /// Creates a requester against [`DEFAULT_BASE_URL`].
    pub fn new(api_client_id: impl Into<String>, api_client_secret: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_client_id: api_client_id.into(),
            api_client_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Creates a requester against `base_url`, or the default endpoint when `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` if the URL is not https and not a local host.
    pub fn with_base_url(
        api_client_id: impl Into<String>,
        api_client_secret: SecretString,
        base_url: Option<String>,
    ) -> Result<Self, Error> {
        let mut requester = Self::new(api_client_id, api_client_secret);
        if let Some(base_url) = base_url {
            validate_base_url(&base_url)?;
            requester.base_url = base_url;
        }
        Ok(requester)
    }

    /// Applies a per-request timeout to every call.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Result<Self, Error> {
        self.client = Client::builder()
            .timeout(StdDuration::from_secs(timeout_seconds))
            .build()?;
        Ok(self)
    }

    /// Replaces the retry schedule of unsigned operations.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn envelope(
        operation_name: &str,
        query: &str,
        variables: Value,
        signed: bool,
    ) -> Result<Vec<u8>, Error> {
        let (nonce, expires_at) = if signed {
            let nonce: u32 = rand::thread_rng().gen();
            let expires_at =
                (Utc::now() + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true);
            (nonce, expires_at)
        } else {
            (0, String::new())
        };
        let payload = json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
            "nonce": nonce,
            "expires_at": expires_at,
        });
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Executes a GraphQL operation and returns its `data` object.
    ///
    /// Unsigned operations are retried while the failure is retryable.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` when no operation name can be extracted
    /// - `Request` for a non-2xx HTTP status
    /// - `GraphQl` for the first entry of `errors` carrying an `error_name`
    /// - `GraphQlInternal` for any other `errors` entry
    pub async fn execute_graphql(
        &self,
        query: &str,
        variables: Value,
        signing_key: Option<&SigningKey>,
    ) -> Result<Value, Error> {
        let operation_name = operation_name(query)?;
        let body = Self::envelope(&operation_name, query, variables, signing_key.is_some())?;

        tracing::debug!(
            "Executing GraphQL operation {} (signed: {})",
            operation_name,
            signing_key.is_some()
        );

        if let Some(key) = signing_key {
            let signature = key.sign(&body)?;
            let header = json!({
                "v": 1,
                "signature": base64::engine::general_purpose::STANDARD.encode(signature),
            })
            .to_string();
            return self.send(&operation_name, &body, Some(&header)).await;
        }

        let operation = operation_name.as_str();
        let payload = body.as_slice();
        let mut attempt = 0u32;
        RetryIf::spawn(
            self.retry.delays(),
            move || {
                attempt += 1;
                if attempt > 1 {
                    tracing::info!("Retrying GraphQL operation {} (attempt {})", operation, attempt);
                }
                self.send(operation, payload, None)
            },
            |e: &Error| e.is_retryable(),
        )
        .await
    }

    async fn send(
        &self,
        operation_name: &str,
        body: &[u8],
        signing_header: Option<&str>,
    ) -> Result<Value, Error> {
        let mut request = self
            .client
            .post(&self.base_url)
            .basic_auth(
                &self.api_client_id,
                Some(self.api_client_secret.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .header(OPERATION_HEADER, operation_name)
            .header(USER_AGENT, user_agent())
            .header(SDK_HEADER, user_agent());
        if let Some(header) = signing_header {
            request = request.header(SIGNING_HEADER, header);
        }

        let response = request.body(body.to_vec()).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("GraphQL operation {} failed with status {}", operation_name, status);
            return Err(Error::Request {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        let mut result: Value = response.json().await?;
        if let Some(first) = result
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(
                match first
                    .get("extensions")
                    .and_then(|extensions| extensions.get("error_name"))
                    .and_then(Value::as_str)
                {
                    Some(error_type) => Error::GraphQl {
                        error_type: error_type.to_string(),
                        message,
                    },
                    None => Error::GraphQlInternal(message),
                },
            );
        }

        match result.get_mut("data") {
            Some(data) if data.is_object() => Ok(data.take()),
            _ => Err(Error::GraphQlInternal(
                "response did not contain data".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name() {
        assert_eq!(
            operation_name("query GetNode($id: ID!) { entity(id: $id) { id } }").unwrap(),
            "GetNode"
        );
        assert_eq!(
            operation_name("\n  MUTATION PayInvoice { pay_invoice { id } }").unwrap(),
            "PayInvoice"
        );
        assert!(matches!(
            operation_name("{ current_account { id } }"),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://api.lightspark.com/graphql/server/rc").is_ok());
        assert!(validate_base_url("http://localhost:5000/graphql").is_ok());
        assert!(validate_base_url("http://127.0.0.1:5000/graphql").is_ok());
        assert!(validate_base_url("http://api.dev.local/graphql").is_ok());
        assert!(validate_base_url("http://api.cluster.internal/graphql").is_ok());

        let err = validate_base_url("http://api.lightspark.com/graphql").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid base url: Must be https:// if not targeting localhost"
        );
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn test_unsigned_envelope_has_empty_nonce() {
        let body = Requester::envelope("GetNode", "query GetNode { x }", json!({"a": 1}), false)
            .unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["operationName"], "GetNode");
        assert_eq!(parsed["nonce"], 0);
        assert_eq!(parsed["expires_at"], "");
        assert_eq!(parsed["variables"]["a"], 1);
    }

    #[test]
    fn test_signed_envelope_expires_in_an_hour() {
        let body =
            Requester::envelope("PayInvoice", "mutation PayInvoice { x }", json!({}), true)
                .unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        let expires_at = chrono::DateTime::parse_from_rfc3339(parsed["expires_at"].as_str().unwrap())
            .unwrap();
        let remaining = expires_at.with_timezone(&Utc) - Utc::now();
        assert!(remaining > Duration::minutes(59));
        assert!(remaining <= Duration::hours(1));
    }

    #[test]
    fn test_user_agent() {
        assert!(user_agent().starts_with("lightspark-rust-sdk/"));
    }

    #[test]
    fn test_with_base_url_rejects_plain_http() {
        let result = Requester::with_base_url(
            "id",
            SecretString::new("secret".to_string()),
            Some("http://example.com/graphql".to_string()),
        );
        assert!(matches!(result, Err(Error::InvalidBaseUrl(_))));
    }
}
