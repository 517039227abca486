//! Trait for hosted-service client implementations
//!
//! The remote-signing engine and the UMA flows only talk to the hosted service
//! through this trait. [`LightsparkClient`](crate::client::LightsparkClient)
//! implements it over HTTP; [`MockLightsparkClient`](crate::mock_client::MockLightsparkClient)
//! implements it in memory for tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::model::{InvoiceData, Invoice, Offer, OutgoingPayment};
use crate::signing_key_loader::SigningKeyLoader;

#[async_trait]
pub trait LightsparkApi: Send + Sync {
    /// Executes an unsigned GraphQL operation and returns its `data` object.
    async fn execute_graphql(&self, query: &str, variables: Value) -> Result<Value, Error>;

    /// Executes a GraphQL operation signed with the loaded key of `node_id`.
    async fn execute_graphql_signed(
        &self,
        node_id: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, Error>;

    // Node methods

    /// UTXOs of the node's channels, reported to counterparties for pre-screening
    async fn get_node_channel_utxos(&self, node_id: &str) -> Result<Vec<String>, Error>;

    async fn get_node_public_key(&self, node_id: &str) -> Result<Option<String>, Error>;

    /// Unwraps and stores the signing key used for fund-moving operations of `node_id`.
    async fn load_node_signing_key(
        &self,
        node_id: &str,
        loader: &SigningKeyLoader,
    ) -> Result<(), Error>;

    // Invoice methods

    async fn decode_payment_request(&self, encoded_payment_request: &str)
        -> Result<InvoiceData, Error>;

    /// Creates an invoice whose description hash is SHA-256 of `metadata`.
    async fn create_uma_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error>;

    async fn create_lnurl_invoice(
        &self,
        node_id: &str,
        amount_msats: i64,
        metadata: &str,
        expiry_secs: Option<i32>,
    ) -> Result<Invoice, Error>;

    // Payment methods

    async fn pay_uma_invoice(
        &self,
        node_id: &str,
        encoded_invoice: &str,
        timeout_secs: i32,
        maximum_fees_msats: i64,
        amount_msats: Option<i64>,
    ) -> Result<OutgoingPayment, Error>;

    async fn get_outgoing_payment(&self, payment_id: &str)
        -> Result<Option<OutgoingPayment>, Error>;

    // Offer methods

    async fn create_offer(
        &self,
        node_id: &str,
        amount_msats: Option<i64>,
        description: Option<&str>,
    ) -> Result<Offer, Error>;

    async fn pay_offer(
        &self,
        node_id: &str,
        encoded_offer: &str,
        timeout_secs: i32,
        maximum_fees_msats: i64,
        amount_msats: Option<i64>,
        idempotency_key: Option<&str>,
    ) -> Result<OutgoingPayment, Error>;
}
