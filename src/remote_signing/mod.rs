//! # Remote signing
//!
//! Nodes running in remote-signing mode keep their master seed with the
//! operator. The hosted service asks for every signature through a
//! `REMOTE_SIGNING` webhook; this module turns such a webhook into a typed
//! [`SigningRequest`], lets a [`Validator`] approve it, computes the answer with
//! the seed and reports it back through a GraphQL mutation.
//!
//! ```rust,no_run
//! use lightspark_rs::crypto::MasterSeed;
//! use lightspark_rs::remote_signing::{HashValidator, RemoteSigningEngine};
//! use lightspark_rs::webhooks;
//!
//! # async fn run(client: &lightspark_rs::client::LightsparkClient, body: &[u8], signature: &str)
//! #     -> Result<(), lightspark_rs::error::Error> {
//! let seed = MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f")?;
//! let engine = RemoteSigningEngine::new(seed, HashValidator);
//! let event = webhooks::verify_and_parse(body, signature, "webhook-secret")?;
//! let outcome = engine.handle(client, &event).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod request;
pub mod response;
pub mod validator;

pub use engine::{RemoteSigningEngine, SigningOutcome};
pub use request::{
    parse_signing_jobs, parse_signing_request, DeriveKeyAndSignRequest, EcdhRequest,
    InvoicePaymentHashRequest, PerCommitmentRequest, ReleasePaymentPreimageRequest,
    RemoteSigningSubEventType, RevealCounterpartyPerCommitmentSecretRequest, SignInvoiceRequest,
    SigningJob, SigningRequest,
};
pub use response::{GraphQlResponse, IdAndSignature, SigningResponse};
pub use validator::{HashValidator, PositiveValidator, Validator};
