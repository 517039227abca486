//! Sending VASP: lookup, pay request and confirmation of an outbound UMA
//! payment. Each stage hands the client a callback UUID that keys the next one.

use std::sync::Arc;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::request_cache::{LnurlpResponseData, PayReqData, SenderRequestCache};
use crate::client_trait::LightsparkApi;
use crate::config::{PaymentPollConfig, UmaServerConfig};
use crate::error::Error;
use crate::model::{OutgoingPayment, TransactionStatus};
use crate::payments::wait_for_payment_completion;
use crate::signing_key_loader::SigningKeyLoader;
use crate::uma::address::{scheme_for_domain, split_uma_address};
use crate::uma::{
    fetch_public_key_for_vasp, get_pay_request, get_post_transaction_callback,
    get_signed_lnurlp_request_url, get_supported_major_versions_from_error_response_body,
    is_uma_address, validate_uma_address, verify_pay_req_response_signature,
    verify_uma_lnurlp_response_signature, Currency, InMemoryNonceCache, InMemoryPublicKeyCache,
    KycStatus, LnurlpRequest, LnurlpResponse, ParsedVersion, PayReqResponse, PayRequestParams,
    SupportedVersions, UtxoWithAmount,
};

const PAYMENT_TIMEOUT_SECS: i32 = 60;
const MAXIMUM_FEES_MSATS: i64 = 1_000_000;
const TRAVEL_RULE_INFO: &str =
    "Here is some fake travel rule info. It's up to you to implement this.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub receiver_currencies: Vec<Currency>,
    pub min_send_sats: i64,
    pub max_send_sats: i64,
    pub callback_uuid: String,
    #[serde(rename = "receiverKYCStatus", skip_serializing_if = "Option::is_none")]
    pub receiver_kyc_status: Option<KycStatus>,
    pub is_uma: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqResult {
    pub encoded_invoice: String,
    pub callback_uuid: String,
    /// Invoice amount in millisatoshis
    pub amount: i64,
    pub conversion_rate: f64,
    pub exchange_fees_msats: i64,
    pub currency_code: String,
    /// Unix seconds
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPaymentResult {
    pub did_succeed: bool,
    pub payment_id: String,
}

/// Query of the pay request stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqParams {
    pub amount: i64,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub is_amount_in_msats: Option<bool>,
}

/// Plain LNURL pay response.
#[derive(Debug, Deserialize)]
struct LnurlInvoiceResponse {
    pr: String,
}

pub struct UmaSender {
    client: Arc<dyn LightsparkApi>,
    config: Arc<UmaServerConfig>,
    http: Client,
    public_keys: Arc<InMemoryPublicKeyCache>,
    nonces: Arc<InMemoryNonceCache>,
    requests: SenderRequestCache,
    versions: SupportedVersions,
    poll: PaymentPollConfig,
    signing_key_loader: SigningKeyLoader,
}

impl std::fmt::Debug for UmaSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UmaSender")
            .field("node_id", &self.config.node_id)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl UmaSender {
    pub fn new(
        client: Arc<dyn LightsparkApi>,
        config: Arc<UmaServerConfig>,
        public_keys: Arc<InMemoryPublicKeyCache>,
        nonces: Arc<InMemoryNonceCache>,
    ) -> Self {
        let signing_key_loader = config.signing_key_loader();
        Self {
            client,
            config,
            http: Client::new(),
            public_keys,
            nonces,
            requests: SenderRequestCache::new(),
            versions: SupportedVersions::default(),
            poll: PaymentPollConfig::default(),
            signing_key_loader,
        }
    }

    pub fn with_versions(mut self, versions: SupportedVersions) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_poll_config(mut self, poll: PaymentPollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn requests(&self) -> &SenderRequestCache {
        &self.requests
    }

    /// Stage L: resolves `receiver_address` at its VASP.
    ///
    /// `vasp_domain` is the domain this VASP is reachable at.
    pub async fn handle_lookup(
        &self,
        receiver_address: &str,
        vasp_domain: &str,
    ) -> Result<LookupResult, Error> {
        validate_uma_address(receiver_address)?;
        let (receiver_id, receiver_domain) = split_uma_address(receiver_address)?;

        if !is_uma_address(receiver_address) {
            let url = LnurlpRequest::lnurl(receiver_address).encode_to_url()?;
            let response = self.http.get(url).send().await?;
            if response.status() != StatusCode::OK {
                return Err(Error::LnurlpRequestFailed(response.status().as_u16()));
            }
            let lnurlp_response: LnurlpResponse = response.json().await?;
            return Ok(self.save_lookup(lnurlp_response, receiver_id, receiver_domain, false));
        }

        let signing_key = self.config.signing_privkey()?;
        let url = get_signed_lnurlp_request_url(
            &signing_key,
            receiver_address,
            vasp_domain,
            true,
            self.versions.current().map(|v| v.to_string()).as_deref(),
        )?;
        let mut response = self.http.get(url).send().await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            let body = response.bytes().await?;
            let supported = get_supported_major_versions_from_error_response_body(&body)?;
            let version = self
                .versions
                .select_highest_supported_version(&supported)
                .ok_or(Error::NoCompatibleUmaVersion)?;
            tracing::info!(
                "Retrying lookup of {} with UMA version {}",
                receiver_address,
                version
            );
            let url = get_signed_lnurlp_request_url(
                &signing_key,
                receiver_address,
                vasp_domain,
                true,
                Some(&version.to_string()),
            )?;
            response = self.http.get(url).send().await?;
        }

        if response.status() != StatusCode::OK {
            return Err(Error::LnurlpRequestFailed(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let lnurlp_response = match serde_json::from_slice::<LnurlpResponse>(&body) {
            Ok(parsed) if parsed.is_uma_response() => parsed,
            Ok(parsed) => {
                tracing::info!("{} answered without UMA compliance data", receiver_domain);
                return Ok(self.save_lookup(parsed, receiver_id, receiver_domain, false));
            }
            Err(e) => return Err(e.into()),
        };

        let receiver_keys =
            fetch_public_key_for_vasp(&self.http, receiver_domain, &self.public_keys).await?;
        verify_uma_lnurlp_response_signature(&lnurlp_response, &receiver_keys, &self.nonces)?;

        Ok(self.save_lookup(lnurlp_response, receiver_id, receiver_domain, true))
    }

    fn save_lookup(
        &self,
        response: LnurlpResponse,
        receiver_id: &str,
        receiver_domain: &str,
        is_uma: bool,
    ) -> LookupResult {
        let result = LookupResult {
            receiver_currencies: response.currencies.clone().unwrap_or_default(),
            min_send_sats: response.min_sendable / 1000,
            max_send_sats: response.max_sendable / 1000,
            callback_uuid: String::new(),
            receiver_kyc_status: response.compliance.as_ref().map(|c| c.kyc_status),
            is_uma,
        };
        let callback_uuid = self.requests.save_lnurlp_response_data(LnurlpResponseData {
            response,
            receiver_id: receiver_id.to_string(),
            vasp2_domain: receiver_domain.to_string(),
        });
        LookupResult {
            callback_uuid,
            ..result
        }
    }

    /// Stage P: asks the receiving VASP for an invoice.
    pub async fn handle_pay_request(
        &self,
        callback_uuid: &str,
        params: &PayReqParams,
        vasp_domain: &str,
    ) -> Result<PayReqResult, Error> {
        let lookup = self
            .requests
            .get_lnurlp_response_data(callback_uuid)
            .ok_or(Error::InvalidUuid)?;
        if params.amount <= 0 {
            return Err(Error::invalid_input("Invalid amount"));
        }

        if !lookup.response.is_uma_response() {
            return self
                .handle_lnurl_pay_request(callback_uuid, &lookup, params.amount)
                .await;
        }

        let currency_code = params.currency_code.as_deref().unwrap_or("SAT");
        let currency = lookup
            .response
            .currencies
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|currency| currency.code == currency_code)
            .cloned()
            .ok_or_else(|| Error::InvalidCurrency(currency_code.to_string()))?;

        let receiver_keys =
            fetch_public_key_for_vasp(&self.http, &lookup.vasp2_domain, &self.public_keys).await?;
        let utxos = self.client.get_node_channel_utxos(&self.config.node_id).await?;
        let node_pubkey = self.client.get_node_public_key(&self.config.node_id).await?;

        let uma_major_version = lookup
            .response
            .uma_version
            .as_deref()
            .map(str::parse::<ParsedVersion>)
            .transpose()?
            .map_or(0, |version| version.major);

        let payer_identifier = format!("${}@{}", self.config.receiver_user, vasp_domain);
        let requires = |field: &str| {
            lookup
                .response
                .payer_data
                .as_ref()
                .and_then(|options| options.get(field))
                .is_some_and(|option| option.mandatory)
        };
        let pay_request = get_pay_request(
            &self.config.signing_privkey()?,
            PayRequestParams {
                receiver_encryption_pubkey: receiver_keys.encryption_pubkey()?,
                currency_code: currency.code.clone(),
                amount: params.amount,
                is_amount_in_msats: params.is_amount_in_msats.unwrap_or(false),
                payer_identifier: payer_identifier.clone(),
                payer_name: requires("name").then(|| self.config.receiver_user.clone()),
                payer_email: requires("email")
                    .then(|| format!("{}@{}", self.config.receiver_user, vasp_domain)),
                travel_rule_info: Some(TRAVEL_RULE_INFO.to_string()),
                payer_kyc_status: KycStatus::Verified,
                payer_utxos: utxos,
                payer_node_pubkey: node_pubkey,
                utxo_callback: utxo_callback_url(vasp_domain),
                uma_major_version,
            },
        )?;

        let response = self
            .http
            .post(&lookup.response.callback)
            .json(&pay_request)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(Error::PayreqRequestFailed(response.status().as_u16()));
        }
        let pay_req_response: PayReqResponse = response.json().await?;
        if !pay_req_response.is_uma_response() {
            return Err(Error::invalid_input("payreq response is not UMA"));
        }
        if uma_major_version >= 1 {
            verify_pay_req_response_signature(
                &pay_req_response,
                &payer_identifier,
                &receiver_keys,
                &self.nonces,
            )?;
        }

        let invoice_data = self
            .client
            .decode_payment_request(&pay_req_response.encoded_invoice)
            .await?;
        let (conversion_rate, exchange_fees_msats, currency_code) =
            match &pay_req_response.payment_info {
                Some(info) => (
                    info.multiplier,
                    info.exchange_fees_millisatoshi,
                    info.currency_code.clone(),
                ),
                None => (currency.millisatoshi_per_unit, 0, currency.code.clone()),
            };

        let result = PayReqResult {
            encoded_invoice: pay_req_response.encoded_invoice.clone(),
            callback_uuid: callback_uuid.to_string(),
            amount: invoice_data.amount.to_msats()?,
            conversion_rate,
            exchange_fees_msats,
            currency_code,
            expires_at: invoice_data.expires_at.timestamp(),
        };
        self.requests.save_pay_req_data(
            callback_uuid,
            PayReqData {
                encoded_invoice: pay_req_response.encoded_invoice,
                utxo_callback: pay_req_response
                    .compliance
                    .and_then(|compliance| compliance.utxo_callback),
                invoice_data,
            },
        );
        self.requests.delete_lnurlp_response_data(callback_uuid);
        Ok(result)
    }

    async fn handle_lnurl_pay_request(
        &self,
        callback_uuid: &str,
        lookup: &LnurlpResponseData,
        amount_msats: i64,
    ) -> Result<PayReqResult, Error> {
        let mut url = url::Url::parse(&lookup.response.callback)?;
        url.query_pairs_mut()
            .append_pair("amount", &amount_msats.to_string());
        let response = self.http.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Error::PayreqRequestFailed(response.status().as_u16()));
        }
        let invoice: LnurlInvoiceResponse = response.json().await?;
        let invoice_data = self.client.decode_payment_request(&invoice.pr).await?;

        let result = PayReqResult {
            encoded_invoice: invoice.pr.clone(),
            callback_uuid: callback_uuid.to_string(),
            amount: invoice_data.amount.to_msats()?,
            conversion_rate: 1.0,
            exchange_fees_msats: 0,
            currency_code: "mSAT".to_string(),
            expires_at: invoice_data.expires_at.timestamp(),
        };
        self.requests.save_pay_req_data(
            callback_uuid,
            PayReqData {
                encoded_invoice: invoice.pr,
                utxo_callback: None,
                invoice_data,
            },
        );
        self.requests.delete_lnurlp_response_data(callback_uuid);
        Ok(result)
    }

    /// Stage C: pays the invoice from stage P and reports the UTXOs used.
    ///
    /// Fails with `PaymentTimeout` when the payment does not settle in time; it
    /// may still complete later.
    pub async fn handle_send_payment(
        &self,
        callback_uuid: &str,
        vasp_domain: &str,
    ) -> Result<SendPaymentResult, Error> {
        let pay_req = self
            .requests
            .take_pay_req_data(callback_uuid)
            .ok_or_else(|| Error::Forbidden("unknown payment request".to_string()))?;

        if pay_req.invoice_data.amount.to_msats()? == 0 {
            return Err(Error::InvalidInvoice(
                "cannot pay zero-amount invoices via UMA".to_string(),
            ));
        }
        if pay_req.invoice_data.is_expired_at(Utc::now()) {
            return Err(Error::InvoiceExpired(pay_req.encoded_invoice));
        }

        self.client
            .load_node_signing_key(&self.config.node_id, &self.signing_key_loader)
            .await?;
        let payment = self
            .client
            .pay_uma_invoice(
                &self.config.node_id,
                &pay_req.encoded_invoice,
                PAYMENT_TIMEOUT_SECS,
                MAXIMUM_FEES_MSATS,
                None,
            )
            .await?;
        let payment_id = payment.id.clone();

        let payment = wait_for_payment_completion(self.client.as_ref(), payment, &self.poll)
            .await
            .map_err(|e| {
                if matches!(e, Error::PaymentTimeout) {
                    tracing::warn!("Payment {} did not settle in time", payment_id);
                }
                e
            })?;

        let did_succeed = payment.status == TransactionStatus::Success;
        if did_succeed {
            if let Some(utxo_callback) = &pay_req.utxo_callback {
                if let Err(e) = self
                    .send_post_transaction_callback(&payment, utxo_callback, vasp_domain)
                    .await
                {
                    tracing::error!("Failed to post UTXOs to {}: {}", utxo_callback, e);
                }
            }
        }

        Ok(SendPaymentResult {
            did_succeed,
            payment_id,
        })
    }

    async fn send_post_transaction_callback(
        &self,
        payment: &OutgoingPayment,
        utxo_callback: &str,
        vasp_domain: &str,
    ) -> Result<(), Error> {
        let utxos = payment
            .uma_post_transaction_data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|data| {
                Ok(UtxoWithAmount {
                    utxo: data.utxo.clone(),
                    amount_msats: data.amount.to_msats()?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let callback =
            get_post_transaction_callback(utxos, vasp_domain, &self.config.signing_privkey()?)?;

        let response = self.http.post(utxo_callback).json(&callback).send().await?;
        if !response.status().is_success() {
            return Err(Error::Request {
                status: response.status().as_u16(),
                message: "utxo callback rejected".to_string(),
            });
        }
        tracing::info!(
            "Posted {} UTXOs of payment {} to {}",
            callback.utxos.len(),
            payment.id,
            utxo_callback
        );
        Ok(())
    }
}

/// Where a counterparty reports the UTXOs of a settled payment.
pub fn utxo_callback_url(vasp_domain: &str) -> String {
    format!(
        "{}://{}/api/uma/utxocallback?txid=1234",
        scheme_for_domain(vasp_domain),
        vasp_domain
    )
}
