//! # Lightspark Client Library
//!
//! A Rust client for the Lightspark GraphQL API, a remote-signing engine for
//! nodes whose keys never leave the operator, and the UMA (Universal Money
//! Address) protocol with a demo sending and receiving VASP.
//!
//! ## Modules
//!
//! - [`client`] - Authenticated client for the hosted GraphQL service
//! - [`requester`] - GraphQL transport with retries and request signing
//! - [`model`] - Data structures for API requests and responses
//! - [`webhooks`] - Webhook signature verification and parsing
//! - [`remote_signing`] - Validation and signing of remote-signing webhooks
//! - [`crypto`] - Key derivation, signing and key unwrapping primitives
//! - [`uma`] - UMA wire messages, signatures and version negotiation
//! - [`vasp`] - Sending and receiving VASP flows built on [`uma`]
//! - [`server`] - axum routers for the remote-signing and UMA demo servers
//! - [`mock_client`] - In-memory API client for integration testing
//! - [`mocks`] - httpmock helpers for testing against a fake service
//!
//! ## Master Seed Handling
//!
//! The node master seed is held in a [`crypto::MasterSeed`], which zeroizes
//! on drop and never prints its bytes. Loading it is the only place the raw
//! value is read from configuration.
//!
//! **⚠️ The remote-signing validators shipped here are demonstrations.** A
//! production signer should decide what to sign from its own policy.

pub mod client;
pub mod client_trait;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mock_client;
pub mod mocks;
pub mod model;
pub mod payments;
pub mod queries;
pub mod remote_signing;
pub mod requester;
pub mod server;
pub mod signing_key_loader;
pub mod uma;
pub mod vasp;
pub mod webhooks;

pub use client::LightsparkClient;
pub use client_trait::LightsparkApi;
pub use config::{
    Config, PaymentPollConfig, RemoteSigningServerConfig, RetryConfig, UmaServerConfig,
};
pub use crypto::{MasterSeed, Network};
pub use error::{Error, ErrorKind};
pub use mock_client::MockLightsparkClient;
pub use model::{
    CurrencyAmount, CurrencyUnit, Invoice, InvoiceData, Offer, OutgoingPayment, TransactionStatus,
};
pub use remote_signing::{RemoteSigningEngine, SigningOutcome, Validator};
pub use requester::{Requester, SigningKey};
pub use signing_key_loader::SigningKeyLoader;
pub use webhooks::{WebhookEvent, WebhookEventType};
