//! Mock hosted-service client for testing
//!
//! [`MockLightsparkClient`] implements [`LightsparkApi`] in memory. Raw GraphQL
//! calls answer with responses registered per operation name; the typed
//! methods keep nodes, invoices and payments in maps. Every call is recorded
//! with its operation name and variables so tests can assert on what would
//! have been sent.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lightspark_rs::client_trait::LightsparkApi;
//! use lightspark_rs::mock_client::MockLightsparkClient;
//! use lightspark_rs::model::TransactionStatus;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), lightspark_rs::error::Error> {
//! let client = MockLightsparkClient::new()
//!     .with_channel_utxos("node-id", vec!["txid:0".to_string()])
//!     .with_payment_statuses(vec![TransactionStatus::Pending, TransactionStatus::Success]);
//!
//! let utxos = client.get_node_channel_utxos("node-id").await?;
//! assert_eq!(utxos, vec!["txid:0".to_string()]);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::client::metadata_hash;
use crate::client_trait::LightsparkApi;
use crate::crypto::Network;
use crate::error::Error;
use crate::model::{
    CurrencyAmount, Invoice, InvoiceData, NodeReference, Offer, OutgoingPayment,
    PostTransactionData, TransactionStatus,
};
use crate::requester::{operation_name, SigningKey};
use crate::signing_key_loader::SigningKeyLoader;

const DEFAULT_INVOICE_EXPIRY_SECS: i64 = 600;

/// In-memory [`LightsparkApi`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MockLightsparkClient {
    inner: Arc<MockLightsparkClientInner>,
}

#[derive(Debug, Default)]
struct MockLightsparkClientInner {
    graphql_responses: Mutex<HashMap<String, Value>>,
    executed: Mutex<Vec<(String, Value)>>,
    node_keys: Mutex<HashMap<String, SigningKey>>,
    channel_utxos: Mutex<HashMap<String, Vec<String>>>,
    node_public_keys: Mutex<HashMap<String, String>>,
    invoices: Mutex<HashMap<String, InvoiceData>>,
    payments: Mutex<HashMap<String, OutgoingPayment>>,
    payment_statuses: Mutex<VecDeque<TransactionStatus>>,
    next_id: AtomicU64,
}

impl MockLightsparkClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers raw GraphQL calls of `operation` with `data`.
    pub fn with_graphql_response(self, operation: &str, data: Value) -> Self {
        self.inner
            .graphql_responses
            .lock()
            .insert(operation.to_string(), data);
        self
    }

    pub fn with_channel_utxos(self, node_id: &str, utxos: Vec<String>) -> Self {
        self.inner
            .channel_utxos
            .lock()
            .insert(node_id.to_string(), utxos);
        self
    }

    pub fn with_node_public_key(self, node_id: &str, public_key: &str) -> Self {
        self.inner
            .node_public_keys
            .lock()
            .insert(node_id.to_string(), public_key.to_string());
        self
    }

    pub fn with_node_signing_key(self, node_id: &str, key: SigningKey) -> Self {
        self.inner.node_keys.lock().insert(node_id.to_string(), key);
        self
    }

    /// Makes `decode_payment_request` know `invoice`.
    pub fn with_decoded_invoice(self, invoice: InvoiceData) -> Self {
        self.inner
            .invoices
            .lock()
            .insert(invoice.encoded_payment_request.clone(), invoice);
        self
    }

    /// Statuses returned by successive `get_outgoing_payment` reads.
    ///
    /// Once exhausted, payments read as `SUCCESS`.
    pub fn with_payment_statuses(self, statuses: Vec<TransactionStatus>) -> Self {
        *self.inner.payment_statuses.lock() = statuses.into();
        self
    }

    /// Operation names of every call, in order.
    pub fn executed_operations(&self) -> Vec<String> {
        self.inner
            .executed
            .lock()
            .iter()
            .map(|(operation, _)| operation.clone())
            .collect()
    }

    /// Operation names and variables of every call, in order.
    pub fn executed_requests(&self) -> Vec<(String, Value)> {
        self.inner.executed.lock().clone()
    }

    pub fn has_node_signing_key(&self, node_id: &str) -> bool {
        self.inner.node_keys.lock().contains_key(node_id)
    }

    fn record(&self, operation: &str, variables: Value) {
        self.inner
            .executed
            .lock()
            .push((operation.to_string(), variables));
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn require_signing_key(&self, node_id: &str) -> Result<(), Error> {
        if self.has_node_signing_key(node_id) {
            Ok(())
        } else {
            Err(Error::SigningKeyNotLoaded(node_id.to_string()))
        }
    }

    fn canned_response(&self, operation: &str) -> Result<Value, Error> {
        self.inner
            .graphql_responses
            .lock()
            .get(operation)
            .cloned()
            .ok_or_else(|| Error::GraphQlInternal(format!("no mock response for {}", operation)))
    }

    fn create_invoice(
        &self,
        operation: &str,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Invoice {
        let hash = metadata_hash(metadata);
        self.record(
            operation,
            json!({
                "node_id": node_id,
                "amount_msats": amount_msats,
                "metadata_hash": hash,
                "expiry_secs": expiry_secs,
            }),
        );

        let id = self.next_id();
        let now = Utc::now();
        let expiry = expiry_secs.map_or(DEFAULT_INVOICE_EXPIRY_SECS, i64::from);
        let data = InvoiceData {
            encoded_payment_request: format!("lnbcrt{}1pmock{}", amount_msats, id),
            bitcoin_network: Network::Regtest,
            payment_hash: hash,
            amount: CurrencyAmount::msats(amount_msats),
            created_at: now,
            expires_at: now + Duration::seconds(expiry),
            memo: None,
            destination: Some(NodeReference {
                id: Some(node_id.to_string()),
                public_key: self.inner.node_public_keys.lock().get(node_id).cloned(),
            }),
        };
        self.inner
            .invoices
            .lock()
            .insert(data.encoded_payment_request.clone(), data.clone());
        Invoice {
            id: format!("Invoice:{}", id),
            status: Some("OPEN".to_string()),
            data,
        }
    }

    fn start_payment(&self, node_id: &str, amount: CurrencyAmount) -> OutgoingPayment {
        let post_transaction_data = self
            .inner
            .channel_utxos
            .lock()
            .get(node_id)
            .map(|utxos| {
                utxos
                    .iter()
                    .map(|utxo| PostTransactionData {
                        utxo: utxo.clone(),
                        amount,
                    })
                    .collect()
            });
        let payment = OutgoingPayment {
            id: format!("OutgoingPayment:{}", self.next_id()),
            status: TransactionStatus::Pending,
            amount,
            fees: Some(CurrencyAmount::msats(0)),
            uma_post_transaction_data: post_transaction_data,
        };
        self.inner
            .payments
            .lock()
            .insert(payment.id.clone(), payment.clone());
        payment
    }
}

#[async_trait]
impl LightsparkApi for MockLightsparkClient {
    async fn execute_graphql(&self, query: &str, variables: Value) -> Result<Value, Error> {
        let operation = operation_name(query)?;
        self.record(&operation, variables);
        self.canned_response(&operation)
    }

    async fn execute_graphql_signed(
        &self,
        node_id: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, Error> {
        self.require_signing_key(node_id)?;
        self.execute_graphql(query, variables).await
    }

    async fn get_node_channel_utxos(&self, node_id: &str) -> Result<Vec<String>, Error> {
        self.record("GetNodeChannelUtxos", json!({ "node_id": node_id }));
        Ok(self
            .inner
            .channel_utxos
            .lock()
            .get(node_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_node_public_key(&self, node_id: &str) -> Result<Option<String>, Error> {
        self.record("GetNodePublicKey", json!({ "node_id": node_id }));
        Ok(self.inner.node_public_keys.lock().get(node_id).cloned())
    }

    async fn load_node_signing_key(
        &self,
        node_id: &str,
        loader: &SigningKeyLoader,
    ) -> Result<(), Error> {
        let key = loader.load(self).await?;
        self.inner.node_keys.lock().insert(node_id.to_string(), key);
        Ok(())
    }

    async fn decode_payment_request(
        &self,
        encoded_payment_request: &str,
    ) -> Result<InvoiceData, Error> {
        self.record(
            "DecodedPaymentRequest",
            json!({ "encoded_payment_request": encoded_payment_request }),
        );
        self.inner
            .invoices
            .lock()
            .get(encoded_payment_request)
            .cloned()
            .ok_or_else(|| Error::InvalidInvoice(format!("unknown invoice {}", encoded_payment_request)))
    }

    async fn create_uma_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error> {
        Ok(self.create_invoice("CreateUmaInvoice", node_id, amount_msats, metadata, expiry_secs))
    }

    async fn create_lnurl_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error> {
        Ok(self.create_invoice("CreateLnurlInvoice", node_id, amount_msats, metadata, expiry_secs))
    }

    async fn pay_uma_invoice(
        &self,
        node_id: &str,
        encoded_invoice: &str,
        timeout_secs: i32,
        maximum_fees_msats: i64,
        amount_msats: Option<i64>,
    ) -> Result<OutgoingPayment, Error> {
        self.require_signing_key(node_id)?;
        self.record(
            "PayUmaInvoice",
            json!({
                "node_id": node_id,
                "encoded_invoice": encoded_invoice,
                "timeout_secs": timeout_secs,
                "maximum_fees_msats": maximum_fees_msats,
                "amount_msats": amount_msats,
            }),
        );
        let amount = match amount_msats {
            Some(amount_msats) => CurrencyAmount::msats(amount_msats),
            None => self
                .inner
                .invoices
                .lock()
                .get(encoded_invoice)
                .map(|invoice| invoice.amount)
                .ok_or_else(|| Error::InvalidInvoice(format!("unknown invoice {}", encoded_invoice)))?,
        };
        Ok(self.start_payment(node_id, amount))
    }

    async fn get_outgoing_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<OutgoingPayment>, Error> {
        self.record("GetOutgoingPayment", json!({ "id": payment_id }));
        let mut payments = self.inner.payments.lock();
        let Some(payment) = payments.get_mut(payment_id) else {
            return Ok(None);
        };
        if !payment.status.is_final() {
            payment.status = self
                .inner
                .payment_statuses
                .lock()
                .pop_front()
                .unwrap_or(TransactionStatus::Success);
        }
        Ok(Some(payment.clone()))
    }

    async fn create_offer(
        &self,
        node_id: &str,
        amount_msats: Option<i64>,
        description: Option<&str>,
    ) -> Result<Offer, Error> {
        self.record(
            "CreateOffer",
            json!({
                "node_id": node_id,
                "amount_msats": amount_msats,
                "description": description,
            }),
        );
        let id = self.next_id();
        Ok(Offer {
            id: format!("Offer:{}", id),
            encoded_offer: format!("lno1mock{}", id),
        })
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
        self.require_signing_key(node_id)?;
        self.record(
            "PayOffer",
            json!({
                "node_id": node_id,
                "encoded_offer": encoded_offer,
                "timeout_secs": timeout_secs,
                "maximum_fees_msats": maximum_fees_msats,
                "amount_msats": amount_msats,
                "idempotency_key": idempotency_key,
            }),
        );
        Ok(self.start_payment(node_id, CurrencyAmount::msats(amount_msats.unwrap_or_default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_invoice_decodes() {
        let client = MockLightsparkClient::new().with_node_public_key("node-id", "02ab");
        let invoice = client
            .create_uma_invoice("node-id", 5_000, "[[\"text/plain\",\"hi\"]]", Some(60))
            .await
            .unwrap();
        let decoded = client
            .decode_payment_request(&invoice.data.encoded_payment_request)
            .await
            .unwrap();
        assert_eq!(decoded.amount.to_msats().unwrap(), 5_000);
        assert_eq!(decoded.payment_hash, metadata_hash("[[\"text/plain\",\"hi\"]]"));
        assert_eq!(
            decoded.destination.unwrap().public_key.as_deref(),
            Some("02ab")
        );
        assert_eq!(
            client.executed_operations(),
            vec!["CreateUmaInvoice", "DecodedPaymentRequest"]
        );
    }

    #[tokio::test]
    async fn test_payment_statuses_advance_until_final() {
        let client = MockLightsparkClient::new()
            .with_node_signing_key("node-id", SigningKey::rsa(vec![1]))
            .with_payment_statuses(vec![TransactionStatus::Pending, TransactionStatus::Failed]);
        let payment = client
            .pay_offer("node-id", "lno1", 60, 1_000, Some(2_000), None)
            .await
            .unwrap();
        assert_eq!(payment.status, TransactionStatus::Pending);

        let read = |id: String| {
            let client = client.clone();
            async move { client.get_outgoing_payment(&id).await.unwrap().unwrap().status }
        };
        assert_eq!(read(payment.id.clone()).await, TransactionStatus::Pending);
        assert_eq!(read(payment.id.clone()).await, TransactionStatus::Failed);
        assert_eq!(read(payment.id.clone()).await, TransactionStatus::Failed);
        assert!(client.get_outgoing_payment("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unregistered_operation_fails() {
        let client = MockLightsparkClient::new();
        let err = client
            .execute_graphql("query Unknown { x }", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no mock response for Unknown");
    }
}
