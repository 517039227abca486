//! Receiving VASP: answers lnurlp queries and pay requests for its one user.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::client_trait::LightsparkApi;
use crate::config::UmaServerConfig;
use crate::error::Error;
use crate::uma::address::{scheme_for_domain, validate_domain};
use crate::uma::messages::invoice_metadata;
use crate::uma::{
    fetch_public_key_for_vasp, get_lnurlp_response, get_pay_req_response,
    get_vasp_domain_from_uma_address, validate_uma_address, verify_pay_req_signature,
    verify_post_transaction_callback_signature, verify_uma_lnurlp_query_signature,
    ConvertibleCurrency, CounterPartyDataOption, CounterPartyDataOptions, Currency,
    InMemoryNonceCache, InMemoryPublicKeyCache, KycStatus, LnurlpRequest, LnurlpResponse,
    LnurlpResponseParams, PayReqResponse, PayReqResponseParams, PayRequest,
    PostTransactionCallback, PubKeyResponse, SupportedVersions,
};

use super::sender::utxo_callback_url;

pub const MIN_SENDABLE_MSATS: i64 = 1_000;
pub const MAX_SENDABLE_MSATS: i64 = 100_000_000_000;
const UMA_INVOICE_EXPIRY_SECS: i32 = 600;
const EXCHANGE_FEES_MSATS: i64 = 100_000;
const PUBKEY_VALIDITY_DAYS: i64 = 14;

/// Currencies the demo receiver can be credited in.
pub fn receiver_currencies() -> Vec<Currency> {
    vec![
        Currency {
            code: "USD".to_string(),
            name: "US Dollars".to_string(),
            symbol: "$".to_string(),
            millisatoshi_per_unit: 22883.56,
            convertible: ConvertibleCurrency {
                min_sendable: 1,
                max_sendable: 1_000,
            },
            decimals: 2,
        },
        Currency {
            code: "SAT".to_string(),
            name: "Satoshis".to_string(),
            symbol: "SAT".to_string(),
            millisatoshi_per_unit: 1000.0,
            convertible: ConvertibleCurrency {
                min_sendable: 1,
                max_sendable: 100_000_000,
            },
            decimals: 0,
        },
    ]
}

fn payer_data_options() -> CounterPartyDataOptions {
    let mut options = BTreeMap::new();
    for (field, mandatory) in [
        ("identifier", true),
        ("compliance", true),
        ("name", false),
        ("email", false),
    ] {
        options.insert(field.to_string(), CounterPartyDataOption { mandatory });
    }
    options
}

pub struct UmaReceiver {
    client: Arc<dyn LightsparkApi>,
    config: Arc<UmaServerConfig>,
    http: Client,
    public_keys: Arc<InMemoryPublicKeyCache>,
    nonces: Arc<InMemoryNonceCache>,
    versions: SupportedVersions,
}

impl std::fmt::Debug for UmaReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UmaReceiver")
            .field("receiver_user", &self.config.receiver_user)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl UmaReceiver {
    pub fn new(
        client: Arc<dyn LightsparkApi>,
        config: Arc<UmaServerConfig>,
        public_keys: Arc<InMemoryPublicKeyCache>,
        nonces: Arc<InMemoryNonceCache>,
    ) -> Self {
        Self {
            client,
            config,
            http: Client::new(),
            public_keys,
            nonces,
            versions: SupportedVersions::default(),
        }
    }

    pub fn with_versions(mut self, versions: SupportedVersions) -> Self {
        self.versions = versions;
        self
    }

    pub fn versions(&self) -> &SupportedVersions {
        &self.versions
    }

    /// Body of `/.well-known/lnurlpubkey`.
    pub fn public_keys(&self) -> PubKeyResponse {
        PubKeyResponse {
            signing_pub_key: self.config.signing_pubkey_hex.clone(),
            encryption_pub_key: self.config.encryption_pubkey_hex.clone(),
            expiration_timestamp: Some(
                (Utc::now() + Duration::days(PUBKEY_VALIDITY_DAYS)).timestamp(),
            ),
        }
    }

    /// `[["text/plain", …], ["text/identifier", …]]` for the receiving user.
    pub fn encoded_metadata(&self, vasp_domain: &str) -> Result<String, Error> {
        let user = &self.config.receiver_user;
        Ok(serde_json::to_string(&json!([
            ["text/plain", format!("Pay to {} user {}", vasp_domain, user)],
            ["text/identifier", format!("{}@{}", user, vasp_domain)],
        ]))?)
    }

    fn callback_url(&self, vasp_domain: &str) -> String {
        format!(
            "{}://{}/api/uma/payreq/{}",
            scheme_for_domain(vasp_domain),
            vasp_domain,
            self.config.receiver_user_id
        )
    }

    fn check_user(&self, username: &str) -> Result<(), Error> {
        let user = &self.config.receiver_user;
        if username == user || username.strip_prefix('$') == Some(user.as_str()) {
            Ok(())
        } else {
            Err(Error::invalid_input(format!("User not found: {}", username)))
        }
    }

    fn check_user_id(&self, uuid: &str) -> Result<(), Error> {
        if uuid == self.config.receiver_user_id {
            Ok(())
        } else {
            Err(Error::InvalidUuid)
        }
    }

    /// Answers `GET /.well-known/lnurlp/<username>`.
    ///
    /// `url` is the full request URL; plain LNURL queries get an unsigned
    /// response. A requested UMA version outside ours fails with
    /// `UnsupportedVersion`.
    pub async fn handle_lnurlp(
        &self,
        username: &str,
        url: &Url,
        vasp_domain: &str,
    ) -> Result<LnurlpResponse, Error> {
        self.check_user(username)?;
        let request = LnurlpRequest::parse(url, &self.versions)?;
        let metadata = self.encoded_metadata(vasp_domain)?;

        if !request.is_uma_request() {
            return Ok(LnurlpResponse {
                tag: "payRequest".to_string(),
                callback: self.callback_url(vasp_domain),
                min_sendable: MIN_SENDABLE_MSATS,
                max_sendable: MAX_SENDABLE_MSATS,
                metadata,
                currencies: Some(receiver_currencies()),
                payer_data: None,
                compliance: None,
                uma_version: None,
            });
        }

        let sender_domain = request
            .vasp_domain
            .as_deref()
            .ok_or_else(|| Error::missing_field("vaspDomain"))?;
        validate_domain(sender_domain)?;
        let sender_keys =
            fetch_public_key_for_vasp(&self.http, sender_domain, &self.public_keys).await?;
        verify_uma_lnurlp_query_signature(&request, &sender_keys, &self.nonces)?;
        tracing::info!("Verified lnurlp request from {}", sender_domain);

        get_lnurlp_response(
            &request,
            &self.config.signing_privkey()?,
            LnurlpResponseParams {
                callback: self.callback_url(vasp_domain),
                encoded_metadata: metadata,
                min_sendable_msats: MIN_SENDABLE_MSATS,
                max_sendable_msats: MAX_SENDABLE_MSATS,
                payer_data_options: payer_data_options(),
                currencies: receiver_currencies(),
                receiver_kyc_status: KycStatus::Verified,
                is_subject_to_travel_rule: true,
            },
        )
    }

    /// Answers the plain LNURL `GET /api/uma/payreq/<uuid>?amount=<msats>`.
    pub async fn handle_lnurl_pay_request(
        &self,
        uuid: &str,
        amount_msats: i64,
        vasp_domain: &str,
    ) -> Result<PayReqResponse, Error> {
        self.check_user_id(uuid)?;
        if amount_msats <= 0 {
            return Err(Error::invalid_input("Invalid amount"));
        }
        let invoice = self
            .client
            .create_lnurl_invoice(
                &self.config.node_id,
                amount_msats,
                &self.encoded_metadata(vasp_domain)?,
                None,
            )
            .await?;
        Ok(PayReqResponse {
            encoded_invoice: invoice.data.encoded_payment_request,
            routes: Vec::new(),
            compliance: None,
            payment_info: None,
        })
    }

    /// Answers the UMA `POST /api/uma/payreq/<uuid>`.
    pub async fn handle_pay_request(
        &self,
        uuid: &str,
        body: &[u8],
        vasp_domain: &str,
    ) -> Result<PayReqResponse, Error> {
        self.check_user_id(uuid)?;
        let request: PayRequest = serde_json::from_slice(body)?;
        if !request.is_uma_request() {
            return Err(Error::invalid_input("pay request is missing compliance data"));
        }

        validate_uma_address(&request.payer_data.identifier)?;
        let sender_domain = get_vasp_domain_from_uma_address(&request.payer_data.identifier)?;
        let sender_keys =
            fetch_public_key_for_vasp(&self.http, &sender_domain, &self.public_keys).await?;
        verify_pay_req_signature(&request, &sender_keys, &self.nonces)?;

        let currency = receiver_currencies()
            .into_iter()
            .find(|currency| currency.code == request.currency)
            .ok_or_else(|| Error::InvalidCurrency(request.currency.clone()))?;
        if request.amount <= 0 {
            return Err(Error::invalid_input("Invalid amount"));
        }
        let amount_msats = if request.is_amount_in_msats.unwrap_or(false) {
            request.amount
        } else {
            (request.amount as f64 * currency.millisatoshi_per_unit).round() as i64
                + EXCHANGE_FEES_MSATS
        };

        let metadata = invoice_metadata(&self.encoded_metadata(vasp_domain)?, &request.payer_data)?;
        let invoice = self
            .client
            .create_uma_invoice(
                &self.config.node_id,
                amount_msats,
                &metadata,
                Some(UMA_INVOICE_EXPIRY_SECS),
            )
            .await?;
        let utxos = self.client.get_node_channel_utxos(&self.config.node_id).await?;
        let node_pubkey = self.client.get_node_public_key(&self.config.node_id).await?;
        tracing::info!(
            "Created invoice of {} msats for {}",
            amount_msats,
            request.payer_data.identifier
        );

        get_pay_req_response(
            &request,
            &self.config.signing_privkey()?,
            PayReqResponseParams {
                encoded_invoice: invoice.data.encoded_payment_request,
                currency_code: currency.code,
                decimals: currency.decimals,
                multiplier: currency.millisatoshi_per_unit,
                exchange_fees_msats: EXCHANGE_FEES_MSATS,
                amount: Some(request.amount),
                receiver_utxos: utxos,
                receiver_node_pubkey: node_pubkey,
                utxo_callback: utxo_callback_url(vasp_domain),
            },
        )
    }

    /// Accepts the UTXOs a sender reports after paying.
    ///
    /// Signed callbacks are verified against the sender's published key.
    pub async fn handle_utxo_callback(
        &self,
        txid: Option<&str>,
        body: &[u8],
    ) -> Result<PostTransactionCallback, Error> {
        let txid = txid.ok_or_else(|| Error::invalid_input("missing txid"))?;
        let callback: PostTransactionCallback = serde_json::from_slice(body)?;

        if let (Some(_), Some(sender_domain)) = (&callback.signature, &callback.vasp_domain) {
            let sender_keys =
                fetch_public_key_for_vasp(&self.http, sender_domain, &self.public_keys).await?;
            verify_post_transaction_callback_signature(&callback, &sender_keys, &self.nonces)?;
        }

        tracing::info!(
            "Received UTXO callback for {}: {:?}",
            txid,
            callback.utxos
        );
        Ok(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECEIVER_USER_ID;
    use crate::crypto::Network;
    use crate::mock_client::MockLightsparkClient;
    use secrecy::SecretString;

    fn config() -> UmaServerConfig {
        UmaServerConfig {
            api_client_id: "client".to_string(),
            api_client_secret: SecretString::new("secret".to_string()),
            api_endpoint: None,
            node_id: "node-id".to_string(),
            receiver_user: "bob".to_string(),
            receiver_user_id: DEFAULT_RECEIVER_USER_ID.to_string(),
            signing_pubkey_hex: "02aa".to_string(),
            signing_privkey_hex: SecretString::new("01".repeat(32)),
            encryption_pubkey_hex: "03bb".to_string(),
            encryption_privkey_hex: SecretString::new("01".repeat(32)),
            remote_signing_master_seed: None,
            osk_signing_key_password: None,
            bitcoin_network: Network::Regtest,
            vasp_domain: None,
            port: 8080,
        }
    }

    fn receiver(client: MockLightsparkClient) -> UmaReceiver {
        UmaReceiver::new(
            Arc::new(client),
            Arc::new(config()),
            Arc::new(InMemoryPublicKeyCache::new()),
            Arc::new(InMemoryNonceCache::new(0)),
        )
    }

    #[test]
    fn test_encoded_metadata() {
        let metadata = receiver(MockLightsparkClient::new())
            .encoded_metadata("vasp2.example.com")
            .unwrap();
        assert_eq!(
            metadata,
            r#"[["text/plain","Pay to vasp2.example.com user bob"],["text/identifier","bob@vasp2.example.com"]]"#
        );
    }

    #[test]
    fn test_public_keys_expire_in_the_future() {
        let keys = receiver(MockLightsparkClient::new()).public_keys();
        assert_eq!(keys.signing_pub_key, "02aa");
        assert!(keys.expiration_timestamp.unwrap() > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_plain_lnurlp_response() {
        let receiver = receiver(MockLightsparkClient::new());
        let url = Url::parse("https://vasp2.example.com/.well-known/lnurlp/bob").unwrap();

        let response = receiver
            .handle_lnurlp("bob", &url, "vasp2.example.com")
            .await
            .unwrap();
        assert!(!response.is_uma_response());
        assert_eq!(
            response.callback,
            format!("https://vasp2.example.com/api/uma/payreq/{}", DEFAULT_RECEIVER_USER_ID)
        );
        assert_eq!(response.currencies.unwrap().len(), 2);

        let url = Url::parse("https://vasp2.example.com/.well-known/lnurlp/$bob").unwrap();
        assert!(receiver.handle_lnurlp("$bob", &url, "vasp2.example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let receiver = receiver(MockLightsparkClient::new());
        let url = Url::parse("https://vasp2.example.com/.well-known/lnurlp/carol").unwrap();
        let err = receiver
            .handle_lnurlp("carol", &url, "vasp2.example.com")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User not found: carol");
    }

    #[tokio::test]
    async fn test_lnurl_pay_request_creates_invoice() {
        let client = MockLightsparkClient::new();
        let receiver = receiver(client.clone());

        let response = receiver
            .handle_lnurl_pay_request(DEFAULT_RECEIVER_USER_ID, 5_000, "vasp2.example.com")
            .await
            .unwrap();
        assert!(response.encoded_invoice.starts_with("lnbcrt5000"));
        assert!(response.compliance.is_none());
        assert_eq!(client.executed_operations(), vec!["CreateLnurlInvoice"]);

        let err = receiver
            .handle_lnurl_pay_request("someone-else", 5_000, "vasp2.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUuid));
    }

    #[tokio::test]
    async fn test_utxo_callback_requires_txid() {
        let receiver = receiver(MockLightsparkClient::new());
        let body = br#"{"utxos":[{"utxo":"txid:0","amountMsats":1000}]}"#;

        assert!(receiver.handle_utxo_callback(None, body).await.is_err());
        let callback = receiver
            .handle_utxo_callback(Some("1234"), body)
            .await
            .unwrap();
        assert_eq!(callback.utxos[0].amount_msats, 1000);
    }
}
