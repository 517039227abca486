//! Builders and verifiers for the signed UMA messages.
//!
//! Every signature is ECDSA over secp256k1 on the SHA-256 of a `|`-joined
//! payload, carried as hex-encoded DER. Verification checks the signature
//! against the counterparty's signing key and then records the nonce, so a
//! message that fails verification never consumes a nonce.

use bitcoin::secp256k1::SecretKey;
use chrono::Utc;
use serde::Serialize;
use url::Url;

use super::nonce_cache::InMemoryNonceCache;
use super::protocol::{
    CompliancePayerData, CounterPartyDataOptions, Currency, KycStatus, LnurlComplianceResponse,
    LnurlpRequest, LnurlpResponse, PayReqResponse, PayReqResponseCompliance,
    PayReqResponsePaymentInfo, PayRequest, PayerData, PostTransactionCallback, PubKeyResponse,
    UtxoWithAmount,
};
use super::version::{select_lower_version, UMA_PROTOCOL_VERSION};
use crate::crypto;
use crate::error::Error;

pub fn generate_nonce() -> String {
    rand::random::<u64>().to_string()
}

fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Hex DER signature of `payload` with a raw 32-byte secp256k1 key.
pub fn sign_payload(signing_private_key: &[u8], payload: &[u8]) -> Result<String, Error> {
    let key = SecretKey::from_slice(signing_private_key)
        .map_err(|_| Error::internal("invalid UMA signing key"))?;
    Ok(hex::encode(crypto::sign_ecdsa(&key, payload)))
}

pub fn verify_signature(
    signing_pubkey: &[u8],
    payload: &[u8],
    signature_hex: &str,
) -> Result<(), Error> {
    let signature = hex::decode(signature_hex)
        .map_err(|_| Error::invalid_signature("signature is not valid hex"))?;
    crypto::verify_ecdsa(signing_pubkey, payload, &signature)
        .map_err(|e| Error::invalid_signature(e.to_string()))
}

fn verify_with_nonce(
    keys: &PubKeyResponse,
    payload: &[u8],
    signature_hex: &str,
    nonce: &str,
    timestamp: i64,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    verify_signature(&keys.signing_pubkey()?, payload, signature_hex)?;
    nonce_cache.check_and_store(nonce, timestamp)
}

/// Signed lnurlp URL for the first contact with a receiving VASP.
///
/// `uma_version` pins the version after a 412 negotiation.
pub fn get_signed_lnurlp_request_url(
    signing_private_key: &[u8],
    receiver_address: &str,
    sender_vasp_domain: &str,
    is_subject_to_travel_rule: bool,
    uma_version: Option<&str>,
) -> Result<Url, Error> {
    let mut request = LnurlpRequest {
        receiver_address: receiver_address.to_string(),
        nonce: Some(generate_nonce()),
        signature: None,
        is_subject_to_travel_rule: Some(is_subject_to_travel_rule),
        vasp_domain: Some(sender_vasp_domain.to_string()),
        timestamp: Some(now_unix()),
        uma_version: Some(uma_version.unwrap_or(UMA_PROTOCOL_VERSION).to_string()),
    };
    request.signature = Some(sign_payload(
        signing_private_key,
        &request.signable_payload()?,
    )?);
    request.encode_to_url()
}

pub fn verify_uma_lnurlp_query_signature(
    request: &LnurlpRequest,
    keys: &PubKeyResponse,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    let signature = request
        .signature
        .as_deref()
        .ok_or_else(|| Error::missing_field("signature"))?;
    let nonce = request
        .nonce
        .as_deref()
        .ok_or_else(|| Error::missing_field("nonce"))?;
    let timestamp = request
        .timestamp
        .ok_or_else(|| Error::missing_field("timestamp"))?;
    verify_with_nonce(
        keys,
        &request.signable_payload()?,
        signature,
        nonce,
        timestamp,
        nonce_cache,
    )
}

/// What a receiving VASP advertises in its lnurlp response.
#[derive(Debug, Clone)]
pub struct LnurlpResponseParams {
    pub callback: String,
    pub encoded_metadata: String,
    pub min_sendable_msats: i64,
    pub max_sendable_msats: i64,
    pub payer_data_options: CounterPartyDataOptions,
    pub currencies: Vec<Currency>,
    pub receiver_kyc_status: KycStatus,
    pub is_subject_to_travel_rule: bool,
}

/// Signed answer to an UMA lnurlp request, on the lower of both versions.
pub fn get_lnurlp_response(
    request: &LnurlpRequest,
    signing_private_key: &[u8],
    params: LnurlpResponseParams,
) -> Result<LnurlpResponse, Error> {
    let requested_version = request
        .uma_version
        .as_deref()
        .ok_or_else(|| Error::missing_field("umaVersion"))?;
    let uma_version = select_lower_version(requested_version, UMA_PROTOCOL_VERSION)?;

    let mut compliance = LnurlComplianceResponse {
        kyc_status: params.receiver_kyc_status,
        signature: String::new(),
        signature_nonce: generate_nonce(),
        signature_timestamp: now_unix(),
        is_subject_to_travel_rule: params.is_subject_to_travel_rule,
        receiver_identifier: request.receiver_address.clone(),
    };
    compliance.signature = sign_payload(signing_private_key, &compliance.signable_payload())?;

    Ok(LnurlpResponse {
        tag: "payRequest".to_string(),
        callback: params.callback,
        min_sendable: params.min_sendable_msats,
        max_sendable: params.max_sendable_msats,
        metadata: params.encoded_metadata,
        currencies: Some(params.currencies),
        payer_data: Some(params.payer_data_options),
        compliance: Some(compliance),
        uma_version: Some(uma_version),
    })
}

pub fn verify_uma_lnurlp_response_signature(
    response: &LnurlpResponse,
    keys: &PubKeyResponse,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    let compliance = response
        .compliance
        .as_ref()
        .ok_or_else(|| Error::missing_field("compliance"))?;
    verify_with_nonce(
        keys,
        &compliance.signable_payload(),
        &compliance.signature,
        &compliance.signature_nonce,
        compliance.signature_timestamp,
        nonce_cache,
    )
}

/// Everything the sending VASP puts into a pay request.
#[derive(Debug, Clone)]
pub struct PayRequestParams {
    pub receiver_encryption_pubkey: Vec<u8>,
    pub currency_code: String,
    pub amount: i64,
    pub is_amount_in_msats: bool,
    pub payer_identifier: String,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    /// Travel-rule info, ECIES-encrypted to the receiver before sending.
    pub travel_rule_info: Option<String>,
    pub payer_kyc_status: KycStatus,
    pub payer_utxos: Vec<String>,
    pub payer_node_pubkey: Option<String>,
    pub utxo_callback: String,
    pub uma_major_version: u32,
}

pub fn get_pay_request(
    signing_private_key: &[u8],
    params: PayRequestParams,
) -> Result<PayRequest, Error> {
    let encrypted_travel_rule_info = params
        .travel_rule_info
        .map(|info| {
            crypto::ecies::encrypt(&params.receiver_encryption_pubkey, info.as_bytes())
                .map(hex::encode)
        })
        .transpose()?;

    let mut request = PayRequest {
        currency: params.currency_code,
        amount: params.amount,
        payer_data: PayerData {
            identifier: params.payer_identifier,
            name: params.payer_name,
            email: params.payer_email,
            compliance: Some(CompliancePayerData {
                utxos: Some(params.payer_utxos),
                node_pub_key: params.payer_node_pubkey,
                kyc_status: params.payer_kyc_status,
                encrypted_travel_rule_info,
                signature: String::new(),
                signature_nonce: generate_nonce(),
                signature_timestamp: now_unix(),
                utxo_callback: params.utxo_callback,
            }),
        },
        uma_major_version: Some(params.uma_major_version),
        is_amount_in_msats: params.is_amount_in_msats.then_some(true),
    };
    let signature = sign_payload(signing_private_key, &request.signable_payload()?)?;
    if let Some(compliance) = request.payer_data.compliance.as_mut() {
        compliance.signature = signature;
    }
    Ok(request)
}

pub fn verify_pay_req_signature(
    request: &PayRequest,
    keys: &PubKeyResponse,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    let compliance = request
        .payer_data
        .compliance
        .as_ref()
        .ok_or_else(|| Error::missing_field("payerData.compliance"))?;
    verify_with_nonce(
        keys,
        &request.signable_payload()?,
        &compliance.signature,
        &compliance.signature_nonce,
        compliance.signature_timestamp,
        nonce_cache,
    )
}

/// Invoice and quote returned by the receiving VASP.
#[derive(Debug, Clone)]
pub struct PayReqResponseParams {
    pub encoded_invoice: String,
    pub currency_code: String,
    pub decimals: u32,
    pub multiplier: f64,
    pub exchange_fees_msats: i64,
    pub amount: Option<i64>,
    pub receiver_utxos: Vec<String>,
    pub receiver_node_pubkey: Option<String>,
    pub utxo_callback: String,
}

/// Signs the response when the sender negotiated major version 1 or later.
pub fn get_pay_req_response(
    request: &PayRequest,
    signing_private_key: &[u8],
    params: PayReqResponseParams,
) -> Result<PayReqResponse, Error> {
    let mut compliance = PayReqResponseCompliance {
        node_pub_key: params.receiver_node_pubkey,
        utxos: params.receiver_utxos,
        utxo_callback: Some(params.utxo_callback),
        signature: None,
        signature_nonce: None,
        signature_timestamp: None,
    };
    if request.uma_major_version.unwrap_or(0) >= 1 {
        compliance.signature_nonce = Some(generate_nonce());
        compliance.signature_timestamp = Some(now_unix());
        let payload = compliance.signable_payload(&request.payer_data.identifier)?;
        compliance.signature = Some(sign_payload(signing_private_key, &payload)?);
    }

    Ok(PayReqResponse {
        encoded_invoice: params.encoded_invoice,
        routes: Vec::new(),
        compliance: Some(compliance),
        payment_info: Some(PayReqResponsePaymentInfo {
            currency_code: params.currency_code,
            decimals: params.decimals,
            multiplier: params.multiplier,
            exchange_fees_millisatoshi: params.exchange_fees_msats,
            amount: params.amount,
        }),
    })
}

pub fn verify_pay_req_response_signature(
    response: &PayReqResponse,
    sender_identifier: &str,
    keys: &PubKeyResponse,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    let compliance = response
        .compliance
        .as_ref()
        .ok_or_else(|| Error::missing_field("compliance"))?;
    let signature = compliance
        .signature
        .as_deref()
        .ok_or_else(|| Error::invalid_signature("payreq response is not signed"))?;
    let payload = compliance.signable_payload(sender_identifier)?;
    verify_with_nonce(
        keys,
        &payload,
        signature,
        compliance.signature_nonce.as_deref().unwrap_or_default(),
        compliance.signature_timestamp.unwrap_or_default(),
        nonce_cache,
    )
}

pub fn get_post_transaction_callback(
    utxos: Vec<UtxoWithAmount>,
    vasp_domain: &str,
    signing_private_key: &[u8],
) -> Result<PostTransactionCallback, Error> {
    let mut callback = PostTransactionCallback {
        utxos,
        vasp_domain: Some(vasp_domain.to_string()),
        signature: None,
        signature_nonce: Some(generate_nonce()),
        signature_timestamp: Some(now_unix()),
    };
    callback.signature = Some(sign_payload(
        signing_private_key,
        &callback.signable_payload()?,
    )?);
    Ok(callback)
}

pub fn verify_post_transaction_callback_signature(
    callback: &PostTransactionCallback,
    keys: &PubKeyResponse,
    nonce_cache: &InMemoryNonceCache,
) -> Result<(), Error> {
    let signature = callback
        .signature
        .as_deref()
        .ok_or_else(|| Error::missing_field("signature"))?;
    verify_with_nonce(
        keys,
        &callback.signable_payload()?,
        signature,
        callback.signature_nonce.as_deref().unwrap_or_default(),
        callback.signature_timestamp.unwrap_or_default(),
        nonce_cache,
    )
}

/// Metadata committed to by an UMA invoice: the LNURL metadata followed by
/// the payer data as JSON.
pub fn invoice_metadata<T: Serialize>(encoded_metadata: &str, payer_data: &T) -> Result<String, Error> {
    Ok(format!(
        "{}{}",
        encoded_metadata,
        serde_json::to_string(payer_data)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{PublicKey, Secp256k1};
    use std::collections::BTreeMap;

    use crate::uma::protocol::CounterPartyDataOption;
    use crate::uma::version::SupportedVersions;

    struct Vasp {
        private_key: Vec<u8>,
        keys: PubKeyResponse,
    }

    fn vasp(byte: u8) -> Vasp {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Vasp {
            private_key: secret.secret_bytes().to_vec(),
            keys: PubKeyResponse {
                signing_pub_key: hex::encode(public.serialize()),
                encryption_pub_key: hex::encode(public.serialize()),
                expiration_timestamp: None,
            },
        }
    }

    fn nonce_cache() -> InMemoryNonceCache {
        InMemoryNonceCache::new(0)
    }

    #[test]
    fn test_signed_lnurlp_request_verifies() {
        let sender = vasp(1);
        let url = get_signed_lnurlp_request_url(
            &sender.private_key,
            "$bob@vasp2.example.com",
            "vasp1.example.com",
            true,
            None,
        )
        .unwrap();
        let request = LnurlpRequest::parse(&url, &SupportedVersions::default()).unwrap();
        assert!(request.is_uma_request());
        assert_eq!(request.uma_version.as_deref(), Some(UMA_PROTOCOL_VERSION));

        let cache = nonce_cache();
        verify_uma_lnurlp_query_signature(&request, &sender.keys, &cache).unwrap();
        let err = verify_uma_lnurlp_query_signature(&request, &sender.keys, &cache).unwrap_err();
        assert!(matches!(err, Error::Replay(_)));
    }

    #[test]
    fn test_lnurlp_request_wrong_key_does_not_consume_nonce() {
        let sender = vasp(1);
        let impostor = vasp(2);
        let url = get_signed_lnurlp_request_url(
            &impostor.private_key,
            "$bob@vasp2.example.com",
            "vasp1.example.com",
            false,
            Some("0.3"),
        )
        .unwrap();
        let request = LnurlpRequest::parse(&url, &SupportedVersions::default()).unwrap();

        let cache = nonce_cache();
        let err = verify_uma_lnurlp_query_signature(&request, &sender.keys, &cache).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lnurlp_response_signed_on_lower_version() {
        let sender = vasp(1);
        let receiver = vasp(2);
        let url = get_signed_lnurlp_request_url(
            &sender.private_key,
            "$bob@vasp2.example.com",
            "vasp1.example.com",
            true,
            Some("0.3"),
        )
        .unwrap();
        let request = LnurlpRequest::parse(&url, &SupportedVersions::default()).unwrap();

        let mut payer_data_options = BTreeMap::new();
        payer_data_options.insert(
            "identifier".to_string(),
            CounterPartyDataOption { mandatory: true },
        );
        let response = get_lnurlp_response(
            &request,
            &receiver.private_key,
            LnurlpResponseParams {
                callback: "https://vasp2.example.com/api/uma/payreq/1".to_string(),
                encoded_metadata: "[]".to_string(),
                min_sendable_msats: 1_000,
                max_sendable_msats: 1_000_000,
                payer_data_options,
                currencies: Vec::new(),
                receiver_kyc_status: KycStatus::Verified,
                is_subject_to_travel_rule: true,
            },
        )
        .unwrap();

        assert!(response.is_uma_response());
        assert_eq!(response.uma_version.as_deref(), Some("0.3"));
        let compliance = response.compliance.as_ref().unwrap();
        assert_eq!(compliance.receiver_identifier, "$bob@vasp2.example.com");

        verify_uma_lnurlp_response_signature(&response, &receiver.keys, &nonce_cache()).unwrap();
        let err = verify_uma_lnurlp_response_signature(&response, &sender.keys, &nonce_cache())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature(_)));
    }

    fn pay_request(sender: &Vasp, receiver: &Vasp, uma_major_version: u32) -> PayRequest {
        get_pay_request(
            &sender.private_key,
            PayRequestParams {
                receiver_encryption_pubkey: receiver.keys.encryption_pubkey().unwrap(),
                currency_code: "USD".to_string(),
                amount: 100,
                is_amount_in_msats: false,
                payer_identifier: "$alice@vasp1.example.com".to_string(),
                payer_name: None,
                payer_email: Some("alice@example.com".to_string()),
                travel_rule_info: Some("travel rule info".to_string()),
                payer_kyc_status: KycStatus::Verified,
                payer_utxos: vec!["txid:0".to_string()],
                payer_node_pubkey: Some("02cc".to_string()),
                utxo_callback: "https://vasp1.example.com/api/uma/utxocallback?txid=1234"
                    .to_string(),
                uma_major_version,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_pay_request_signature_and_travel_rule_encryption() {
        let sender = vasp(1);
        let receiver = vasp(2);
        let request = pay_request(&sender, &receiver, 1);

        verify_pay_req_signature(&request, &sender.keys, &nonce_cache()).unwrap();

        let encrypted = request
            .payer_data
            .compliance
            .as_ref()
            .and_then(|c| c.encrypted_travel_rule_info.clone())
            .unwrap();
        let decrypted =
            crypto::ecies::decrypt(&receiver.private_key, &hex::decode(encrypted).unwrap())
                .unwrap();
        assert_eq!(decrypted, b"travel rule info");

        let mut tampered = request.clone();
        tampered.payer_data.identifier = "$mallory@vasp1.example.com".to_string();
        assert!(verify_pay_req_signature(&tampered, &sender.keys, &nonce_cache()).is_err());
    }

    #[test]
    fn test_pay_req_response_signed_from_version_one() {
        let sender = vasp(1);
        let receiver = vasp(2);
        let params = PayReqResponseParams {
            encoded_invoice: "lnbcrt1000n1pmock".to_string(),
            currency_code: "USD".to_string(),
            decimals: 2,
            multiplier: 22883.56,
            exchange_fees_msats: 100_000,
            amount: Some(100),
            receiver_utxos: Vec::new(),
            receiver_node_pubkey: None,
            utxo_callback: "https://vasp2.example.com/api/uma/utxocallback?txid=1234".to_string(),
        };

        let request = pay_request(&sender, &receiver, 1);
        let response = get_pay_req_response(&request, &receiver.private_key, params.clone()).unwrap();
        assert!(response.is_uma_response());
        verify_pay_req_response_signature(
            &response,
            "$alice@vasp1.example.com",
            &receiver.keys,
            &nonce_cache(),
        )
        .unwrap();

        let legacy = pay_request(&sender, &receiver, 0);
        let response = get_pay_req_response(&legacy, &receiver.private_key, params).unwrap();
        assert!(response.compliance.as_ref().unwrap().signature.is_none());
    }

    #[test]
    fn test_post_transaction_callback_signature() {
        let receiver = vasp(2);
        let callback = get_post_transaction_callback(
            vec![UtxoWithAmount {
                utxo: "txid:1".to_string(),
                amount_msats: 1_000,
            }],
            "vasp2.example.com",
            &receiver.private_key,
        )
        .unwrap();
        let cache = nonce_cache();
        verify_post_transaction_callback_signature(&callback, &receiver.keys, &cache).unwrap();
        assert!(verify_post_transaction_callback_signature(&callback, &receiver.keys, &cache).is_err());
    }

    #[test]
    fn test_invoice_metadata() {
        let payer_data = PayerData {
            identifier: "$alice@vasp1.example.com".to_string(),
            name: None,
            email: None,
            compliance: None,
        };
        assert_eq!(
            invoice_metadata("[]", &payer_data).unwrap(),
            r#"[]{"identifier":"$alice@vasp1.example.com"}"#
        );
    }
}
