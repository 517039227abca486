//! Typed signing requests parsed from `REMOTE_SIGNING` webhooks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::Network;
use crate::error::Error;
use crate::webhooks::{WebhookEvent, WebhookEventType};

/// Value of `data.sub_event_type` on a remote-signing webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteSigningSubEventType {
    Ecdh,
    GetPerCommitmentPoint,
    ReleasePerCommitmentSecret,
    SignInvoice,
    DeriveKeyAndSign,
    ReleasePaymentPreimage,
    RequestInvoicePaymentHash,
    RevealCounterpartyPerCommitmentSecret,
}

impl RemoteSigningSubEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteSigningSubEventType::Ecdh => "ECDH",
            RemoteSigningSubEventType::GetPerCommitmentPoint => "GET_PER_COMMITMENT_POINT",
            RemoteSigningSubEventType::ReleasePerCommitmentSecret => {
                "RELEASE_PER_COMMITMENT_SECRET"
            }
            RemoteSigningSubEventType::SignInvoice => "SIGN_INVOICE",
            RemoteSigningSubEventType::DeriveKeyAndSign => "DERIVE_KEY_AND_SIGN",
            RemoteSigningSubEventType::ReleasePaymentPreimage => "RELEASE_PAYMENT_PREIMAGE",
            RemoteSigningSubEventType::RequestInvoicePaymentHash => {
                "REQUEST_INVOICE_PAYMENT_HASH"
            }
            RemoteSigningSubEventType::RevealCounterpartyPerCommitmentSecret => {
                "REVEAL_COUNTERPARTY_PER_COMMITMENT_SECRET"
            }
        }
    }
}

impl FromStr for RemoteSigningSubEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDH" => Ok(RemoteSigningSubEventType::Ecdh),
            "GET_PER_COMMITMENT_POINT" => Ok(RemoteSigningSubEventType::GetPerCommitmentPoint),
            "RELEASE_PER_COMMITMENT_SECRET" => {
                Ok(RemoteSigningSubEventType::ReleasePerCommitmentSecret)
            }
            "SIGN_INVOICE" => Ok(RemoteSigningSubEventType::SignInvoice),
            "DERIVE_KEY_AND_SIGN" => Ok(RemoteSigningSubEventType::DeriveKeyAndSign),
            "RELEASE_PAYMENT_PREIMAGE" => Ok(RemoteSigningSubEventType::ReleasePaymentPreimage),
            "REQUEST_INVOICE_PAYMENT_HASH" => {
                Ok(RemoteSigningSubEventType::RequestInvoicePaymentHash)
            }
            "REVEAL_COUNTERPARTY_PER_COMMITMENT_SECRET" => {
                Ok(RemoteSigningSubEventType::RevealCounterpartyPerCommitmentSecret)
            }
            other => Err(Error::invalid_input(format!(
                "invalid remote signing sub_event_type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RemoteSigningSubEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message the node wants signed with a key derived from the master seed.
///
/// The signing key is the key at `derivation_path`, tweaked to `mul_tweak·k + add_tweak`.
/// Jobs whose path ends in `/4` sign a PSBT carried in `transaction`; all other
/// jobs sign a BIP-143 digest of `transaction` spending `amount` under `script`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningJob {
    pub id: String,
    pub derivation_path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_tweak: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mul_tweak: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Older webhooks say whether `message` is already a digest; absent means it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_raw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_derivation_path: Option<String>,
}

impl SigningJob {
    pub fn message_bytes(&self) -> Result<Vec<u8>, Error> {
        hex::decode(&self.message)
            .map_err(|_| Error::invalid_input(format!("invalid message in signing job {}", self.id)))
    }

    pub fn add_tweak_bytes(&self) -> Result<Option<Vec<u8>>, Error> {
        self.tweak_bytes(self.add_tweak.as_deref(), "add_tweak")
    }

    pub fn mul_tweak_bytes(&self) -> Result<Option<Vec<u8>>, Error> {
        self.tweak_bytes(self.mul_tweak.as_deref(), "mul_tweak")
    }

    fn tweak_bytes(&self, tweak: Option<&str>, name: &str) -> Result<Option<Vec<u8>>, Error> {
        tweak
            .map(|tweak| {
                hex::decode(tweak).map_err(|_| {
                    Error::invalid_input(format!("invalid {} in signing job {}", name, self.id))
                })
            })
            .transpose()
    }

    /// Whether the job signs input 0 of a PSBT rather than a raw segwit transaction.
    pub fn is_psbt(&self) -> bool {
        self.derivation_path.ends_with("/4")
    }

    pub fn is_raw(&self) -> bool {
        self.is_raw.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhRequest {
    pub node_id: String,
    pub peer_pubkey_hex: String,
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerCommitmentRequest {
    pub channel_id: String,
    pub node_id: String,
    pub derivation_path: String,
    pub index: u64,
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePaymentHashRequest {
    pub invoice_id: String,
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInvoiceRequest {
    pub invoice_id: String,
    pub payment_request_hash: String,
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePaymentPreimageRequest {
    pub invoice_id: String,
    pub nonce: Option<String>,
    pub network: Network,
    pub is_uma: bool,
    pub is_lnurl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriveKeyAndSignRequest {
    pub signing_jobs: Vec<SigningJob>,
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealCounterpartyPerCommitmentSecretRequest {
    pub channel_id: String,
    pub node_id: String,
    pub index: u64,
    pub secret: String,
}

/// A remote-signing webhook, classified by sub-event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningRequest {
    Ecdh(EcdhRequest),
    GetPerCommitmentPoint(PerCommitmentRequest),
    ReleasePerCommitmentSecret(PerCommitmentRequest),
    RequestInvoicePaymentHash(InvoicePaymentHashRequest),
    SignInvoice(SignInvoiceRequest),
    ReleasePaymentPreimage(ReleasePaymentPreimageRequest),
    DeriveKeyAndSign(DeriveKeyAndSignRequest),
    RevealCounterpartyPerCommitmentSecret(RevealCounterpartyPerCommitmentSecretRequest),
}

impl SigningRequest {
    pub fn sub_event_type(&self) -> RemoteSigningSubEventType {
        match self {
            SigningRequest::Ecdh(_) => RemoteSigningSubEventType::Ecdh,
            SigningRequest::GetPerCommitmentPoint(_) => {
                RemoteSigningSubEventType::GetPerCommitmentPoint
            }
            SigningRequest::ReleasePerCommitmentSecret(_) => {
                RemoteSigningSubEventType::ReleasePerCommitmentSecret
            }
            SigningRequest::RequestInvoicePaymentHash(_) => {
                RemoteSigningSubEventType::RequestInvoicePaymentHash
            }
            SigningRequest::SignInvoice(_) => RemoteSigningSubEventType::SignInvoice,
            SigningRequest::ReleasePaymentPreimage(_) => {
                RemoteSigningSubEventType::ReleasePaymentPreimage
            }
            SigningRequest::DeriveKeyAndSign(_) => RemoteSigningSubEventType::DeriveKeyAndSign,
            SigningRequest::RevealCounterpartyPerCommitmentSecret(_) => {
                RemoteSigningSubEventType::RevealCounterpartyPerCommitmentSecret
            }
        }
    }
}

fn data_of(event: &WebhookEvent) -> Result<&Map<String, Value>, Error> {
    event.data.as_ref().ok_or_else(|| Error::missing_field("data"))
}

fn string_field(data: &Map<String, Value>, name: &str) -> Result<String, Error> {
    match data.get(name) {
        None | Some(Value::Null) => Err(Error::missing_field(name)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(Error::invalid_input(format!(
            "invalid {} in webhook ({})",
            name, other
        ))),
    }
}

fn optional_string_field(data: &Map<String, Value>, name: &str) -> Result<Option<String>, Error> {
    match data.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => string_field(data, name).map(Some),
    }
}

fn integer_field(data: &Map<String, Value>, name: &str) -> Result<u64, Error> {
    let value = data.get(name).filter(|value| !value.is_null());
    let value = value.ok_or_else(|| Error::missing_field(name))?;
    value
        .as_i64()
        .and_then(|number| u64::try_from(number).ok())
        .ok_or_else(|| Error::invalid_input(format!("invalid {} in webhook ({})", name, value)))
}

fn bool_field(data: &Map<String, Value>, name: &str) -> bool {
    data.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn network_field(data: &Map<String, Value>) -> Result<Network, Error> {
    let network = string_field(data, "bitcoin_network")?;
    network
        .parse::<Network>()
        .map_err(|_| Error::InvalidNetwork(network))
}

/// Reads `data.signing_jobs`, accepting both the current and the `is_raw` job shapes.
pub fn parse_signing_jobs(data: &Map<String, Value>) -> Result<Vec<SigningJob>, Error> {
    match data.get("signing_jobs") {
        None | Some(Value::Null) => Err(Error::missing_field("signing_jobs")),
        Some(jobs) => Ok(serde_json::from_value(jobs.clone())?),
    }
}

/// Classifies a `REMOTE_SIGNING` webhook into a [`SigningRequest`].
///
/// # Errors
///
/// - `InvalidInput` if the event is not a remote-signing event or has an unknown sub-event type
/// - `MissingField(name)` for any absent required field
/// - `InvalidNetwork` if `bitcoin_network` is not `MAINNET`, `TESTNET` or `REGTEST`
pub fn parse_signing_request(event: &WebhookEvent) -> Result<SigningRequest, Error> {
    if event.event_type != WebhookEventType::RemoteSigning {
        return Err(Error::invalid_input(
            "webhook event is not for remote signing",
        ));
    }
    let data = data_of(event)?;
    let sub_event_type: RemoteSigningSubEventType =
        string_field(data, "sub_event_type")?.parse()?;
    tracing::debug!("Parsing {} webhook {}", sub_event_type, event.event_id);

    let request = match sub_event_type {
        RemoteSigningSubEventType::Ecdh => SigningRequest::Ecdh(EcdhRequest {
            node_id: event.entity_id.clone(),
            peer_pubkey_hex: string_field(data, "peer_public_key")?,
            network: network_field(data)?,
        }),
        RemoteSigningSubEventType::GetPerCommitmentPoint => {
            SigningRequest::GetPerCommitmentPoint(per_commitment_request(event, data)?)
        }
        RemoteSigningSubEventType::ReleasePerCommitmentSecret => {
            SigningRequest::ReleasePerCommitmentSecret(per_commitment_request(event, data)?)
        }
        RemoteSigningSubEventType::RequestInvoicePaymentHash => {
            SigningRequest::RequestInvoicePaymentHash(InvoicePaymentHashRequest {
                invoice_id: string_field(data, "invoice_id")?,
                network: network_field(data)?,
            })
        }
        RemoteSigningSubEventType::SignInvoice => SigningRequest::SignInvoice(SignInvoiceRequest {
            invoice_id: string_field(data, "invoice_id")?,
            payment_request_hash: string_field(data, "payreq_hash")?,
            network: network_field(data)?,
        }),
        RemoteSigningSubEventType::ReleasePaymentPreimage => {
            SigningRequest::ReleasePaymentPreimage(ReleasePaymentPreimageRequest {
                invoice_id: string_field(data, "invoice_id")?,
                nonce: optional_string_field(data, "preimage_nonce")?,
                network: network_field(data)?,
                is_uma: bool_field(data, "is_uma"),
                is_lnurl: bool_field(data, "is_lnurl"),
            })
        }
        RemoteSigningSubEventType::DeriveKeyAndSign => {
            SigningRequest::DeriveKeyAndSign(DeriveKeyAndSignRequest {
                signing_jobs: parse_signing_jobs(data)?,
                network: network_field(data)?,
            })
        }
        RemoteSigningSubEventType::RevealCounterpartyPerCommitmentSecret => {
            SigningRequest::RevealCounterpartyPerCommitmentSecret(
                RevealCounterpartyPerCommitmentSecretRequest {
                    channel_id: event.entity_id.clone(),
                    node_id: string_field(data, "node_id")?,
                    index: integer_field(data, "per_commitment_secret_idx")?,
                    secret: string_field(data, "per_commitment_secret")?,
                },
            )
        }
    };
    Ok(request)
}

fn per_commitment_request(
    event: &WebhookEvent,
    data: &Map<String, Value>,
) -> Result<PerCommitmentRequest, Error> {
    Ok(PerCommitmentRequest {
        channel_id: event.entity_id.clone(),
        index: integer_field(data, "per_commitment_point_idx")?,
        derivation_path: string_field(data, "derivation_path")?,
        node_id: string_field(data, "node_id")?,
        network: network_field(data)?,
    })
}
