//! Hosted-service client over the GraphQL [`Requester`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::client_trait::LightsparkApi;
use crate::config::Config;
use crate::error::Error;
use crate::model::{InvoiceData, Invoice, Offer, OutgoingPayment};
use crate::queries;
use crate::requester::{Requester, SigningKey};
use crate::signing_key_loader::SigningKeyLoader;

/// Reads `data.<path>` and deserializes it.
///
/// A missing or null field is an internal error of the hosted service.
pub(crate) fn field_at<T: DeserializeOwned>(mut data: Value, path: &[&str]) -> Result<T, Error> {
    for name in path {
        data = match data.get_mut(*name) {
            Some(value) if !value.is_null() => value.take(),
            _ => {
                return Err(Error::GraphQlInternal(format!(
                    "missing {} in response",
                    path.join(".")
                )))
            }
        };
    }
    Ok(serde_json::from_value(data)?)
}

/// SHA-256 hex of invoice metadata, committed to as the BOLT-11 description hash.
pub fn metadata_hash(metadata: &str) -> String {
    hex::encode(Sha256::digest(metadata.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct LightsparkClient {
    requester: Requester,
    node_keys: Arc<RwLock<HashMap<String, SigningKey>>>,
}

impl LightsparkClient {
    pub fn new(api_client_id: impl Into<String>, api_client_secret: SecretString) -> Self {
        Self::with_requester(Requester::new(api_client_id, api_client_secret))
    }

    pub fn with_requester(requester: Requester) -> Self {
        Self {
            requester,
            node_keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a client from the SDK configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` for a rejected endpoint and `Reqwest` if the
    /// HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let requester = Requester::with_base_url(
            config.api_client_id.clone(),
            config.api_client_secret.clone(),
            config.api_endpoint.clone(),
        )?
        .with_timeout(config.request_timeout_seconds)?
        .with_retry_config(config.retry.clone());
        Ok(Self::with_requester(requester))
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Stores an already unwrapped signing key for `node_id`.
    pub fn set_node_signing_key(&self, node_id: impl Into<String>, key: SigningKey) {
        self.node_keys.write().insert(node_id.into(), key);
    }

    fn node_signing_key(&self, node_id: &str) -> Result<SigningKey, Error> {
        self.node_keys
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| Error::SigningKeyNotLoaded(node_id.to_string()))
    }

    async fn create_invoice(
        &self,
        query: &str,
        output_field: &str,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error> {
        let mut variables = json!({
            "node_id": node_id,
            "amount_msats": amount_msats,
            "metadata_hash": metadata_hash(metadata),
        });
        if let Some(expiry_secs) = expiry_secs {
            variables["expiry_secs"] = json!(expiry_secs);
        }
        let data = self.execute_graphql(query, variables).await?;
        field_at(data, &[output_field, "invoice"])
    }
}

#[async_trait]
impl LightsparkApi for LightsparkClient {
    async fn execute_graphql(&self, query: &str, variables: Value) -> Result<Value, Error> {
        self.requester.execute_graphql(query, variables, None).await
    }

    async fn execute_graphql_signed(
        &self,
        node_id: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, Error> {
        let key = self.node_signing_key(node_id)?;
        self.requester
            .execute_graphql(query, variables, Some(&key))
            .await
    }

    async fn get_node_channel_utxos(&self, node_id: &str) -> Result<Vec<String>, Error> {
        let data = self
            .execute_graphql(queries::NODE_CHANNEL_UTXO_QUERY, json!({ "node_id": node_id }))
            .await?;
        Ok(data
            .get("entity")
            .and_then(|entity| entity.get("uma_prescreening_utxos"))
            .and_then(Value::as_array)
            .map(|utxos| {
                utxos
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_node_public_key(&self, node_id: &str) -> Result<Option<String>, Error> {
        let data = self
            .execute_graphql(queries::NODE_PUBLIC_KEY_QUERY, json!({ "node_id": node_id }))
            .await?;
        Ok(data
            .get("entity")
            .and_then(|entity| entity.get("public_key"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn load_node_signing_key(
        &self,
        node_id: &str,
        loader: &SigningKeyLoader,
    ) -> Result<(), Error> {
        let key = loader.load(self).await?;
        tracing::info!("Loaded signing key for node {}", node_id);
        self.set_node_signing_key(node_id, key);
        Ok(())
    }

    async fn decode_payment_request(
        &self,
        encoded_payment_request: &str,
    ) -> Result<InvoiceData, Error> {
        let data = self
            .execute_graphql(
                queries::DECODE_PAYMENT_REQUEST_QUERY,
                json!({ "encoded_payment_request": encoded_payment_request }),
            )
            .await?;
        let decoded: Value = field_at(data, &["decoded_payment_request"])?;
        match decoded.get("__typename").and_then(Value::as_str) {
            Some("InvoiceData") | None => Ok(serde_json::from_value(decoded)?),
            Some(other) => Err(Error::InvalidInvoice(format!(
                "expected a BOLT-11 invoice, got {}",
                other
            ))),
        }
    }

    async fn create_uma_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error> {
        self.create_invoice(
            queries::CREATE_UMA_INVOICE_MUTATION,
            "create_uma_invoice",
            node_id,
            amount_msats,
            metadata,
            expiry_secs,
        )
        .await
    }

    async fn create_lnurl_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error> {
        self.create_invoice(
            queries::CREATE_LNURL_INVOICE_MUTATION,
            "create_lnurl_invoice",
            node_id,
            amount_msats,
            metadata,
            expiry_secs,
        )
        .await
    }

    async fn pay_uma_invoice(
        &self,
        node_id: &str,
        encoded_invoice: &str,
        timeout_secs: i32,
        maximum_fees_msats: i64,
        amount_msats: Option<i64>,
    ) -> Result<OutgoingPayment, Error> {
        let mut variables = json!({
            "node_id": node_id,
            "encoded_invoice": encoded_invoice,
            "timeout_secs": timeout_secs,
            "maximum_fees_msats": maximum_fees_msats,
        });
        if let Some(amount_msats) = amount_msats {
            variables["amount_msats"] = json!(amount_msats);
        }
        let data = self
            .execute_graphql_signed(node_id, queries::PAY_UMA_INVOICE_MUTATION, variables)
            .await?;
        field_at(data, &["pay_uma_invoice", "payment"])
    }

    async fn get_outgoing_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<OutgoingPayment>, Error> {
        let mut data = self
            .execute_graphql(queries::OUTGOING_PAYMENT_QUERY, json!({ "id": payment_id }))
            .await?;
        match data.get_mut("entity") {
            Some(entity) if !entity.is_null() => Ok(Some(serde_json::from_value(entity.take())?)),
            _ => Ok(None),
        }
    }

    async fn create_offer(
        &self,
        node_id: &str,
        amount_msats: Option<i64>,
        description: Option<&str>,
    ) -> Result<Offer, Error> {
        let data = self
            .execute_graphql(
                queries::CREATE_OFFER_MUTATION,
                json!({
                    "node_id": node_id,
                    "amount_msats": amount_msats,
                    "description": description,
                }),
            )
            .await?;
        field_at(data, &["create_offer", "offer"])
    }

    async fn pay_offer(
        &self,
        node_id: &str,
        encoded_offer: &str,
        timeout_secs: i32,
        maximum_fees_msats: i64,
        amount_msats: Option<i64>,
        idempotency_key: Option<&str>,
    ) -> Result<OutgoingPayment, Error> {
        let data = self
            .execute_graphql_signed(
                node_id,
                queries::PAY_OFFER_MUTATION,
                json!({
                    "node_id": node_id,
                    "encoded_offer": encoded_offer,
                    "timeout_secs": timeout_secs,
                    "maximum_fees_msats": maximum_fees_msats,
                    "amount_msats": amount_msats,
                    "idempotency_key": idempotency_key,
                }),
            )
            .await?;
        field_at(data, &["pay_offer", "payment"])
    }
}
