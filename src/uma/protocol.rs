//! Wire messages exchanged between the sending and receiving VASPs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::address::{scheme_for_domain, split_uma_address};
use super::version::SupportedVersions;
use crate::error::Error;

const LNURLP_PATH_PREFIX: &str = "/.well-known/lnurlp/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    NotVerified,
    Pending,
    Verified,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Currency a receiver can be paid in, with its rate in millisatoshis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub symbol: String,
    #[serde(rename = "multiplier")]
    pub millisatoshi_per_unit: f64,
    pub convertible: ConvertibleCurrency,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertibleCurrency {
    #[serde(rename = "min")]
    pub min_sendable: i64,
    #[serde(rename = "max")]
    pub max_sendable: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPartyDataOption {
    pub mandatory: bool,
}

/// Payer fields the receiver asks for, keyed by field name.
pub type CounterPartyDataOptions = BTreeMap<String, CounterPartyDataOption>;

/// The sender's first request, carried as query parameters of the lnurlp URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LnurlpRequest {
    pub receiver_address: String,
    pub nonce: Option<String>,
    pub signature: Option<String>,
    pub is_subject_to_travel_rule: Option<bool>,
    pub vasp_domain: Option<String>,
    pub timestamp: Option<i64>,
    pub uma_version: Option<String>,
}

impl LnurlpRequest {
    /// A plain LNURL request for `receiver_address`.
    pub fn lnurl(receiver_address: impl Into<String>) -> Self {
        Self {
            receiver_address: receiver_address.into(),
            nonce: None,
            signature: None,
            is_subject_to_travel_rule: None,
            vasp_domain: None,
            timestamp: None,
            uma_version: None,
        }
    }

    pub fn is_uma_request(&self) -> bool {
        self.signature.is_some()
            && self.nonce.is_some()
            && self.vasp_domain.is_some()
            && self.timestamp.is_some()
            && self.uma_version.is_some()
    }

    /// `<address>|<nonce>|<timestamp>`.
    pub fn signable_payload(&self) -> Result<Vec<u8>, Error> {
        let nonce = self
            .nonce
            .as_deref()
            .ok_or_else(|| Error::missing_field("nonce"))?;
        let timestamp = self
            .timestamp
            .ok_or_else(|| Error::missing_field("timestamp"))?;
        Ok(format!("{}|{}|{}", self.receiver_address, nonce, timestamp).into_bytes())
    }

    pub fn encode_to_url(&self) -> Result<Url, Error> {
        let (user, domain) = split_uma_address(&self.receiver_address)?;
        let mut url = Url::parse(&format!(
            "{}://{}{}{}",
            scheme_for_domain(domain),
            domain,
            LNURLP_PATH_PREFIX,
            user
        ))?;
        if self.is_uma_request() {
            let mut query = url.query_pairs_mut();
            if let Some(signature) = &self.signature {
                query.append_pair("signature", signature);
            }
            if let Some(vasp_domain) = &self.vasp_domain {
                query.append_pair("vaspDomain", vasp_domain);
            }
            if let Some(nonce) = &self.nonce {
                query.append_pair("nonce", nonce);
            }
            query.append_pair(
                "isSubjectToTravelRule",
                &self.is_subject_to_travel_rule.unwrap_or(false).to_string(),
            );
            if let Some(timestamp) = self.timestamp {
                query.append_pair("timestamp", &timestamp.to_string());
            }
            if let Some(uma_version) = &self.uma_version {
                query.append_pair("umaVersion", uma_version);
            }
        }
        Ok(url)
    }

    /// Parses an lnurlp URL as received by the receiving VASP.
    ///
    /// A `umaVersion` outside `versions` fails with `UnsupportedVersion` so the
    /// caller can answer 412 with its own supported majors.
    pub fn parse(url: &Url, versions: &SupportedVersions) -> Result<Self, Error> {
        let user = url
            .path()
            .strip_prefix(LNURLP_PATH_PREFIX)
            .filter(|user| !user.is_empty() && !user.contains('/'))
            .ok_or_else(|| Error::invalid_input("invalid lnurlp path"))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_input("lnurlp url has no host"))?;
        let domain = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut request = Self::lnurl(format!("{}@{}", user, domain));
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "signature" => request.signature = Some(value.into_owned()),
                "vaspDomain" => request.vasp_domain = Some(value.into_owned()),
                "nonce" => request.nonce = Some(value.into_owned()),
                "isSubjectToTravelRule" => {
                    request.is_subject_to_travel_rule = Some(value.eq_ignore_ascii_case("true"))
                }
                "timestamp" => {
                    request.timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| Error::invalid_input("invalid timestamp"))?,
                    )
                }
                "umaVersion" => request.uma_version = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(uma_version) = &request.uma_version {
            if !versions.is_version_supported(uma_version) {
                return Err(Error::UnsupportedVersion(uma_version.clone()));
            }
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LnurlComplianceResponse {
    pub kyc_status: KycStatus,
    pub signature: String,
    pub signature_nonce: String,
    pub signature_timestamp: i64,
    pub is_subject_to_travel_rule: bool,
    pub receiver_identifier: String,
}

impl LnurlComplianceResponse {
    /// `<receiverIdentifier>|<nonce>|<timestamp>`.
    pub fn signable_payload(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}",
            self.receiver_identifier, self.signature_nonce, self.signature_timestamp
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LnurlpResponse {
    pub tag: String,
    pub callback: String,
    pub min_sendable: i64,
    pub max_sendable: i64,
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currencies: Option<Vec<Currency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_data: Option<CounterPartyDataOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<LnurlComplianceResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uma_version: Option<String>,
}

impl LnurlpResponse {
    pub fn is_uma_response(&self) -> bool {
        self.uma_version.as_deref().is_some_and(|v| !v.is_empty())
            && self
                .compliance
                .as_ref()
                .is_some_and(|compliance| !compliance.signature.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePayerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pub_key: Option<String>,
    pub kyc_status: KycStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_travel_rule_info: Option<String>,
    pub signature: String,
    pub signature_nonce: String,
    pub signature_timestamp: i64,
    pub utxo_callback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerData {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<CompliancePayerData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    /// Currency code the receiver should be credited in.
    pub currency: String,
    /// In the smallest unit of `currency`, or msats with `is_amount_in_msats`.
    pub amount: i64,
    pub payer_data: PayerData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uma_major_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_amount_in_msats: Option<bool>,
}

impl PayRequest {
    pub fn is_uma_request(&self) -> bool {
        self.payer_data.compliance.is_some()
    }

    /// `<senderIdentifier>|<nonce>|<timestamp>`.
    pub fn signable_payload(&self) -> Result<Vec<u8>, Error> {
        let compliance = self
            .payer_data
            .compliance
            .as_ref()
            .ok_or_else(|| Error::missing_field("payerData.compliance"))?;
        Ok(format!(
            "{}|{}|{}",
            self.payer_data.identifier, compliance.signature_nonce, compliance.signature_timestamp
        )
        .into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqResponseCompliance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pub_key: Option<String>,
    #[serde(default)]
    pub utxos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxo_callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<i64>,
}

impl PayReqResponseCompliance {
    /// `<senderIdentifier>|<nonce>|<timestamp>`.
    pub fn signable_payload(&self, sender_identifier: &str) -> Result<Vec<u8>, Error> {
        let nonce = self
            .signature_nonce
            .as_deref()
            .ok_or_else(|| Error::missing_field("compliance.signatureNonce"))?;
        let timestamp = self
            .signature_timestamp
            .ok_or_else(|| Error::missing_field("compliance.signatureTimestamp"))?;
        Ok(format!("{}|{}|{}", sender_identifier, nonce, timestamp).into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqResponsePaymentInfo {
    pub currency_code: String,
    pub decimals: u32,
    pub multiplier: f64,
    pub exchange_fees_millisatoshi: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqResponse {
    #[serde(rename = "pr")]
    pub encoded_invoice: String,
    #[serde(default)]
    pub routes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<PayReqResponseCompliance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_info: Option<PayReqResponsePaymentInfo>,
}

impl PayReqResponse {
    pub fn is_uma_response(&self) -> bool {
        self.compliance.is_some() && self.payment_info.is_some()
    }
}

/// Body of `/.well-known/lnurlpubkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubKeyResponse {
    pub signing_pub_key: String,
    pub encryption_pub_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<i64>,
}

impl PubKeyResponse {
    pub fn signing_pubkey(&self) -> Result<Vec<u8>, Error> {
        hex::decode(&self.signing_pub_key)
            .map_err(|_| Error::invalid_input("signingPubKey is not valid hex"))
    }

    pub fn encryption_pubkey(&self) -> Result<Vec<u8>, Error> {
        hex::decode(&self.encryption_pub_key)
            .map_err(|_| Error::invalid_input("encryptionPubKey is not valid hex"))
    }

    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expiration_timestamp
            .is_some_and(|expiration| expiration < now_unix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoWithAmount {
    pub utxo: String,
    pub amount_msats: i64,
}

/// Sent to a counterparty's UTXO callback once a payment settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostTransactionCallback {
    pub utxos: Vec<UtxoWithAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vasp_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<i64>,
}

impl PostTransactionCallback {
    /// `<vaspDomain>|<nonce>|<timestamp>`.
    pub fn signable_payload(&self) -> Result<Vec<u8>, Error> {
        let vasp_domain = self
            .vasp_domain
            .as_deref()
            .ok_or_else(|| Error::missing_field("vaspDomain"))?;
        let nonce = self
            .signature_nonce
            .as_deref()
            .ok_or_else(|| Error::missing_field("signatureNonce"))?;
        let timestamp = self
            .signature_timestamp
            .ok_or_else(|| Error::missing_field("signatureTimestamp"))?;
        Ok(format!("{}|{}|{}", vasp_domain, nonce, timestamp).into_bytes())
    }
}

/// 412 body of a receiver that does not speak the requested version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedVersionResponse {
    pub reason: String,
    pub supported_major_versions: String,
    pub unsupported_version: String,
}

impl UnsupportedVersionResponse {
    pub fn new(unsupported_version: impl Into<String>, versions: &SupportedVersions) -> Self {
        Self {
            reason: "Unsupported UMA version".to_string(),
            supported_major_versions: versions.major_versions_csv(),
            unsupported_version: unsupported_version.into(),
        }
    }
}
