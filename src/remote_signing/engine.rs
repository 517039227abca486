use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::client_trait::LightsparkApi;
use crate::crypto::{self, MasterSeed, Network};
use crate::error::Error;
use crate::queries::DECLINE_TO_SIGN_MESSAGES_MUTATION;
use crate::webhooks::{WebhookEvent, WebhookEventType};

use super::request::{
    parse_signing_jobs, parse_signing_request, DeriveKeyAndSignRequest, SigningRequest,
};
use super::response::{IdAndSignature, SigningResponse};
use super::validator::Validator;

/// What happened to a remote-signing webhook after it was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum SigningOutcome {
    /// The signing result was submitted; holds the mutation's output object
    Submitted(Value),
    /// The sub-event needs no answer
    NoResponse,
    /// The validator refused and the decline mutation was submitted
    Declined,
}

impl fmt::Display for SigningOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningOutcome::Submitted(output) => write!(f, "submitted {}", output),
            SigningOutcome::NoResponse => f.write_str("no response"),
            SigningOutcome::Declined => f.write_str("rejected signing"),
        }
    }
}

/// Answers remote-signing webhooks with keys derived from the node master seed.
///
/// The engine holds no per-request state, so one instance serves concurrent
/// webhooks.
pub struct RemoteSigningEngine {
    master_seed: MasterSeed,
    validator: Arc<dyn Validator>,
}

impl fmt::Debug for RemoteSigningEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSigningEngine")
            .field("master_seed", &self.master_seed)
            .finish_non_exhaustive()
    }
}

impl RemoteSigningEngine {
    pub fn new(master_seed: MasterSeed, validator: impl Validator + 'static) -> Self {
        Self {
            master_seed,
            validator: Arc::new(validator),
        }
    }

    /// Mainnet xpubs at the hardened prefix of every signing job's derivation path.
    ///
    /// Events without `signing_jobs` yield an empty list.
    pub fn signing_xpubs(&self, event: &WebhookEvent) -> Result<Vec<String>, Error> {
        let data = match &event.data {
            Some(data) if data.contains_key("signing_jobs") => data,
            _ => return Ok(Vec::new()),
        };
        parse_signing_jobs(data)?
            .iter()
            .map(|job| {
                let (hardened, _) = crypto::split_derivation_path(&job.derivation_path)?;
                Ok(crypto::derive_xpub_hardened(
                    &self.master_seed,
                    &hardened,
                    Network::Mainnet,
                )?)
            })
            .collect()
    }

    /// Validates and signs a webhook without talking to the hosted service.
    ///
    /// # Errors
    ///
    /// Returns `DeclinedToSign` when the validator refuses, and parse or crypto
    /// errors otherwise.
    pub fn signing_response(&self, event: &WebhookEvent) -> Result<Option<SigningResponse>, Error> {
        let xpubs = self.signing_xpubs(event)?;
        if !self.validator.should_sign(event, &xpubs) {
            tracing::warn!("Declined to sign webhook {}", event.event_id);
            return Err(Error::DeclinedToSign);
        }

        let request = parse_signing_request(event)?;
        tracing::info!(
            "Handling {} for webhook {}",
            request.sub_event_type(),
            event.event_id
        );
        self.sign(&request)
    }

    /// Produces the answer for one parsed request.
    pub fn sign(&self, request: &SigningRequest) -> Result<Option<SigningResponse>, Error> {
        let seed = &self.master_seed;
        let response = match request {
            SigningRequest::Ecdh(request) => {
                let peer_pubkey = hex::decode(&request.peer_pubkey_hex)
                    .map_err(|_| Error::invalid_input("invalid peer_public_key in webhook"))?;
                let shared_secret = crypto::ecdh(seed, request.network, &peer_pubkey)?;
                SigningResponse::Ecdh {
                    node_id: request.node_id.clone(),
                    shared_secret_hex: hex::encode(shared_secret),
                }
            }
            SigningRequest::GetPerCommitmentPoint(request) => {
                let point = crypto::per_commitment_point(
                    seed,
                    request.network,
                    &request.derivation_path,
                    request.index,
                )?;
                SigningResponse::GetPerCommitmentPoint {
                    channel_id: request.channel_id.clone(),
                    index: request.index,
                    per_commitment_point_hex: hex::encode(point),
                }
            }
            SigningRequest::ReleasePerCommitmentSecret(request) => {
                let secret = crypto::release_per_commitment_secret(
                    seed,
                    request.network,
                    &request.derivation_path,
                    request.index,
                )?;
                SigningResponse::ReleasePerCommitmentSecret {
                    channel_id: request.channel_id.clone(),
                    index: request.index,
                    per_commitment_secret_hex: hex::encode(secret),
                }
            }
            SigningRequest::RequestInvoicePaymentHash(request) => {
                let nonce = crypto::generate_preimage_nonce();
                let payment_hash = crypto::generate_preimage_hash(seed, &nonce)?;
                SigningResponse::InvoicePaymentHash {
                    invoice_id: request.invoice_id.clone(),
                    payment_hash_hex: hex::encode(payment_hash),
                    nonce_hex: Some(hex::encode(nonce)),
                }
            }
            SigningRequest::SignInvoice(request) => {
                let hash = hex::decode(&request.payment_request_hash)
                    .map_err(|_| Error::invalid_input("invalid payreq_hash in webhook"))?;
                let signature = crypto::sign_invoice_hash(seed, request.network, &hash)?;
                SigningResponse::SignInvoice {
                    invoice_id: request.invoice_id.clone(),
                    signature_hex: hex::encode(signature.signature),
                    recovery_id: signature.recovery_id,
                }
            }
            SigningRequest::ReleasePaymentPreimage(request) => {
                let nonce = request
                    .nonce
                    .as_deref()
                    .ok_or_else(|| Error::missing_field("preimage_nonce"))?;
                let nonce = hex::decode(nonce)
                    .map_err(|_| Error::invalid_input("invalid preimage_nonce in webhook"))?;
                let preimage = crypto::generate_preimage(seed, &nonce)?;
                SigningResponse::ReleasePaymentPreimage {
                    invoice_id: request.invoice_id.clone(),
                    payment_preimage_hex: hex::encode(preimage),
                }
            }
            SigningRequest::DeriveKeyAndSign(request) => self.derive_key_and_sign(request)?,
            SigningRequest::RevealCounterpartyPerCommitmentSecret(request) => {
                tracing::debug!(
                    "Counterparty revealed secret {} on channel {}",
                    request.index,
                    request.channel_id
                );
                return Ok(None);
            }
        };
        Ok(Some(response))
    }

    fn derive_key_and_sign(
        &self,
        request: &DeriveKeyAndSignRequest,
    ) -> Result<SigningResponse, Error> {
        let signatures = request
            .signing_jobs
            .iter()
            .map(|job| {
                let add_tweak = job.add_tweak_bytes()?;
                let mul_tweak = job.mul_tweak_bytes()?;
                let signature = crypto::derive_key_and_sign(
                    &self.master_seed,
                    request.network,
                    &job.message_bytes()?,
                    &job.derivation_path,
                    job.is_raw(),
                    add_tweak.as_deref(),
                    mul_tweak.as_deref(),
                )?;
                Ok(IdAndSignature {
                    id: job.id.clone(),
                    signature: hex::encode(signature),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(SigningResponse::DeriveKeyAndSign { signatures })
    }

    /// Handles a verified webhook end to end: sign and submit, or decline.
    ///
    /// Non remote-signing events are ignored.
    pub async fn handle<C>(&self, client: &C, event: &WebhookEvent) -> Result<SigningOutcome, Error>
    where
        C: LightsparkApi + ?Sized,
    {
        if event.event_type != WebhookEventType::RemoteSigning {
            tracing::debug!("Ignoring {} webhook {}", event.event_type, event.event_id);
            return Ok(SigningOutcome::NoResponse);
        }

        let response = match self.signing_response(event) {
            Ok(Some(response)) => response,
            Ok(None) => return Ok(SigningOutcome::NoResponse),
            Err(Error::DeclinedToSign) => {
                self.decline_to_sign_messages(client, event).await?;
                return Ok(SigningOutcome::Declined);
            }
            Err(e) => return Err(e),
        };

        let graphql = response.graphql_response();
        let mut data = client.execute_graphql(graphql.query, graphql.variables).await?;
        match data.get_mut(graphql.output_field) {
            Some(output) if output.is_object() => Ok(SigningOutcome::Submitted(output.take())),
            _ => Err(Error::GraphQlInternal(format!(
                "missing {} in response",
                graphql.output_field
            ))),
        }
    }

    /// Tells the hosted service the signing jobs of `event` will not be signed.
    ///
    /// Fails with `MissingField("signing_jobs")` when the event carries no jobs
    /// to decline; nothing is sent in that case.
    pub async fn decline_to_sign_messages<C>(
        &self,
        client: &C,
        event: &WebhookEvent,
    ) -> Result<(), Error>
    where
        C: LightsparkApi + ?Sized,
    {
        let data = event
            .data
            .as_ref()
            .ok_or_else(|| Error::missing_field("signing_jobs"))?;
        let payload_ids: Vec<String> = parse_signing_jobs(data)?
            .into_iter()
            .map(|job| job.id)
            .collect();
        tracing::info!(
            "Declining {} signing jobs of webhook {}",
            payload_ids.len(),
            event.event_id
        );
        client
            .execute_graphql(
                DECLINE_TO_SIGN_MESSAGES_MUTATION,
                json!({ "payload_ids": payload_ids }),
            )
            .await?;
        Ok(())
    }
}
