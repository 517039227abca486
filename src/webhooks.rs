//! Verification and parsing of webhook deliveries from the hosted service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::Error;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "lightspark-signature";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WebhookEventType {
    PaymentFinished,
    ForceClosure,
    WithdrawalFinished,
    FundsReceived,
    NodeStatus,
    UmaInvitationClaimed,
    WalletStatus,
    WalletOutgoingPaymentFinished,
    WalletIncomingPaymentFinished,
    WalletWithdrawalFinished,
    WalletFundsReceived,
    RemoteSigning,
    LowBalance,
    HighBalance,
    ChannelOpeningFees,
    /// An event type this SDK version does not know about
    Unknown(String),
}

impl WebhookEventType {
    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::PaymentFinished => "PAYMENT_FINISHED",
            WebhookEventType::ForceClosure => "FORCE_CLOSURE",
            WebhookEventType::WithdrawalFinished => "WITHDRAWAL_FINISHED",
            WebhookEventType::FundsReceived => "FUNDS_RECEIVED",
            WebhookEventType::NodeStatus => "NODE_STATUS",
            WebhookEventType::UmaInvitationClaimed => "UMA_INVITATION_CLAIMED",
            WebhookEventType::WalletStatus => "WALLET_STATUS",
            WebhookEventType::WalletOutgoingPaymentFinished => "WALLET_OUTGOING_PAYMENT_FINISHED",
            WebhookEventType::WalletIncomingPaymentFinished => "WALLET_INCOMING_PAYMENT_FINISHED",
            WebhookEventType::WalletWithdrawalFinished => "WALLET_WITHDRAWAL_FINISHED",
            WebhookEventType::WalletFundsReceived => "WALLET_FUNDS_RECEIVED",
            WebhookEventType::RemoteSigning => "REMOTE_SIGNING",
            WebhookEventType::LowBalance => "LOW_BALANCE",
            WebhookEventType::HighBalance => "HIGH_BALANCE",
            WebhookEventType::ChannelOpeningFees => "CHANNEL_OPENING_FEES",
            WebhookEventType::Unknown(other) => other,
        }
    }
}

impl FromStr for WebhookEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PAYMENT_FINISHED" => WebhookEventType::PaymentFinished,
            "FORCE_CLOSURE" => WebhookEventType::ForceClosure,
            "WITHDRAWAL_FINISHED" => WebhookEventType::WithdrawalFinished,
            "FUNDS_RECEIVED" => WebhookEventType::FundsReceived,
            "NODE_STATUS" => WebhookEventType::NodeStatus,
            "UMA_INVITATION_CLAIMED" => WebhookEventType::UmaInvitationClaimed,
            "WALLET_STATUS" => WebhookEventType::WalletStatus,
            "WALLET_OUTGOING_PAYMENT_FINISHED" => WebhookEventType::WalletOutgoingPaymentFinished,
            "WALLET_INCOMING_PAYMENT_FINISHED" => WebhookEventType::WalletIncomingPaymentFinished,
            "WALLET_WITHDRAWAL_FINISHED" => WebhookEventType::WalletWithdrawalFinished,
            "WALLET_FUNDS_RECEIVED" => WebhookEventType::WalletFundsReceived,
            "REMOTE_SIGNING" => WebhookEventType::RemoteSigning,
            "LOW_BALANCE" => WebhookEventType::LowBalance,
            "HIGH_BALANCE" => WebhookEventType::HighBalance,
            "CHANNEL_OPENING_FEES" => WebhookEventType::ChannelOpeningFees,
            other => WebhookEventType::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub event_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub entity_id: String,
    pub wallet_id: Option<String>,
    /// Event specific payload; remote-signing events carry `sub_event_type` here
    pub data: Option<Map<String, Value>>,
}

fn required_str(object: &Map<String, Value>, key: &str) -> Result<String, Error> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::missing_field(key))
}

/// Verifies `hex_signature` against HMAC-SHA256(secret, body), then parses the body.
///
/// The comparison is case-insensitive and constant time.
pub fn verify_and_parse(
    body: &[u8],
    hex_signature: &str,
    webhook_secret: &str,
) -> Result<WebhookEvent, Error> {
    let expected = hex::decode(hex_signature.trim()).map_err(|_| Error::SignatureMismatch)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| Error::internal(e.to_string()))?;
    mac.update(body);
    if mac.verify_slice(&expected).is_err() {
        tracing::warn!("Webhook message hash does not match signature");
        return Err(Error::SignatureMismatch);
    }
    parse(body)
}

/// Parses a webhook body without verifying its signature.
pub fn parse(body: &[u8]) -> Result<WebhookEvent, Error> {
    let value: Value = serde_json::from_slice(body)?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::invalid_input("webhook body is not a JSON object"))?;

    let event_type = required_str(object, "event_type")?
        .parse::<WebhookEventType>()
        .unwrap_or_else(|never| match never {});
    let timestamp = DateTime::parse_from_rfc3339(&required_str(object, "timestamp")?)?;

    Ok(WebhookEvent {
        event_type,
        event_id: required_str(object, "event_id")?,
        timestamp,
        entity_id: required_str(object, "entity_id")?,
        wallet_id: object
            .get("wallet_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        data: object.get("data").and_then(Value::as_object).cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "3gZ5oQQUASYmqQNuEk0KambNMVkOADDItIJjzUlAWjX";

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_and_parse_node_status() {
        let body = r#"{"event_type": "NODE_STATUS", "event_id": "1615c8be5aa44e429eba700db2ed8ca5", "timestamp": "2023-05-17T23:56:47.874449+00:00", "entity_id": "lightning_node:01882c25-157a-f96b-0000-362d42b64397"}"#;
        let event = verify_and_parse(
            body.as_bytes(),
            "62a8829aeb48b4142533520b1f7f86cdb1ee7d718bf3ea15bc1c662d4c453b74",
            SECRET,
        )
        .unwrap();

        assert_eq!(event.event_type, WebhookEventType::NodeStatus);
        assert_eq!(event.event_id, "1615c8be5aa44e429eba700db2ed8ca5");
        assert_eq!(
            event.entity_id,
            "lightning_node:01882c25-157a-f96b-0000-362d42b64397"
        );
        assert_eq!(
            event.timestamp,
            DateTime::parse_from_rfc3339("2023-05-17T23:56:47.874449+00:00").unwrap()
        );
        assert!(event.wallet_id.is_none());
        assert!(event.data.is_none());
    }

    #[test]
    fn test_verify_and_parse_with_wallet() {
        let body = r#"{"event_type": "WALLET_INCOMING_PAYMENT_FINISHED", "event_id": "1615c8be5aa44e429eba700db2ed8ca5", "timestamp": "2023-05-17T23:56:47.874449+00:00", "entity_id": "lightning_node:01882c25-157a-f96b-0000-362d42b64397", "wallet_id": "wallet:01882c25-157a-f96b-0000-362d42b64397" }"#;
        let event = verify_and_parse(
            body.as_bytes(),
            "B4EEB95F18956B3C33B99E9EFFC61636EFFC4634F83604CB41DE13470C42669A",
            SECRET,
        )
        .unwrap();
        assert_eq!(event.event_type, WebhookEventType::WalletIncomingPaymentFinished);
        assert_eq!(
            event.wallet_id.as_deref(),
            Some("wallet:01882c25-157a-f96b-0000-362d42b64397")
        );
    }

    #[test]
    fn test_tampered_body_or_signature_is_rejected() {
        let body = br#"{"event_type":"NODE_STATUS","event_id":"1","timestamp":"2023-05-17T23:56:47+00:00","entity_id":"node"}"#;
        let signature = sign(body, SECRET);
        assert!(verify_and_parse(body, &signature, SECRET).is_ok());

        let mut tampered = body.to_vec();
        tampered[20] ^= 0x01;
        assert!(matches!(
            verify_and_parse(&tampered, &signature, SECRET),
            Err(Error::SignatureMismatch)
        ));

        let mut bad_signature = signature.into_bytes();
        bad_signature[0] = if bad_signature[0] == b'0' { b'1' } else { b'0' };
        let bad_signature = String::from_utf8(bad_signature).unwrap();
        assert!(matches!(
            verify_and_parse(body, &bad_signature, SECRET),
            Err(Error::SignatureMismatch)
        ));

        assert!(matches!(
            verify_and_parse(body, "not-hex", SECRET),
            Err(Error::SignatureMismatch)
        ));
    }

    #[test]
    fn test_parse_keeps_large_integers() {
        let body = r#"{"event_type": "REMOTE_SIGNING", "event_id": "8be9c360a68e420b9126b43ff6007a32", "timestamp": "2023-08-10T02:14:27.559234+00:00", "entity_id": "node_with_server_signing:0189d6bc-558d-88df-0000-502f04e71816", "data": {"sub_event_type": "GET_PER_COMMITMENT_POINT", "bitcoin_network": "TESTNET", "derivation_path": "m/3/2104864975", "per_commitment_point_idx": 281474976710654}}"#;
        let event = parse(body.as_bytes()).unwrap();
        assert_eq!(event.event_type, WebhookEventType::RemoteSigning);
        let data = event.data.unwrap();
        assert_eq!(
            data["per_commitment_point_idx"].as_i64(),
            Some(281474976710654)
        );
    }

    #[test]
    fn test_parse_missing_field() {
        let body = br#"{"event_type":"NODE_STATUS","timestamp":"2023-05-17T23:56:47+00:00","entity_id":"node"}"#;
        let err = parse(body).unwrap_err();
        assert_eq!(err.to_string(), "missing event_id in webhook");
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let body = br#"{"event_type":"SOMETHING_NEW","event_id":"1","timestamp":"2023-05-17T23:56:47+00:00","entity_id":"node"}"#;
        let event = parse(body).unwrap();
        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("SOMETHING_NEW".to_string())
        );
        assert_eq!(event.event_type.to_string(), "SOMETHING_NEW");
    }
}
