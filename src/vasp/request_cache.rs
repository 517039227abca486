use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::InvoiceData;
use crate::uma::LnurlpResponse;

/// State kept after a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LnurlpResponseData {
    pub response: LnurlpResponse,
    pub receiver_id: String,
    pub vasp2_domain: String,
}

/// State kept after a successful pay request.
#[derive(Debug, Clone, PartialEq)]
pub struct PayReqData {
    pub encoded_invoice: String,
    pub utxo_callback: Option<String>,
    pub invoice_data: InvoiceData,
}

/// In-flight outbound payments, keyed by the callback UUID handed to the client.
#[derive(Debug, Default)]
pub struct SenderRequestCache {
    lnurlp_responses: Mutex<HashMap<String, LnurlpResponseData>>,
    pay_reqs: Mutex<HashMap<String, PayReqData>>,
}

impl SenderRequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_lnurlp_response_data(&self, uuid: &str) -> Option<LnurlpResponseData> {
        self.lnurlp_responses.lock().get(uuid).cloned()
    }

    pub fn get_pay_req_data(&self, uuid: &str) -> Option<PayReqData> {
        self.pay_reqs.lock().get(uuid).cloned()
    }

    /// Stores a lookup result under a fresh UUID and returns it.
    pub fn save_lnurlp_response_data(&self, data: LnurlpResponseData) -> String {
        let uuid = Uuid::new_v4().to_string();
        self.lnurlp_responses.lock().insert(uuid.clone(), data);
        uuid
    }

    /// Stores a pay request result under the UUID of its lookup.
    pub fn save_pay_req_data(&self, uuid: &str, data: PayReqData) {
        self.pay_reqs.lock().insert(uuid.to_string(), data);
    }

    pub fn delete_lnurlp_response_data(&self, uuid: &str) {
        self.lnurlp_responses.lock().remove(uuid);
    }

    /// Removes and returns the pay request under `uuid`, so it can only be paid once.
    pub fn take_pay_req_data(&self, uuid: &str) -> Option<PayReqData> {
        self.pay_reqs.lock().remove(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Network;
    use crate::model::CurrencyAmount;
    use chrono::Utc;

    fn lnurlp_response() -> LnurlpResponse {
        LnurlpResponse {
            tag: "payRequest".to_string(),
            callback: "https://vasp2.example.com/api/uma/payreq/1".to_string(),
            min_sendable: 1_000,
            max_sendable: 1_000_000,
            metadata: "[]".to_string(),
            currencies: None,
            payer_data: None,
            compliance: None,
            uma_version: None,
        }
    }

    #[test]
    fn test_lnurlp_entries_get_unique_uuids() {
        let cache = SenderRequestCache::new();
        let data = LnurlpResponseData {
            response: lnurlp_response(),
            receiver_id: "bob".to_string(),
            vasp2_domain: "vasp2.example.com".to_string(),
        };
        let first = cache.save_lnurlp_response_data(data.clone());
        let second = cache.save_lnurlp_response_data(data.clone());

        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(cache.get_lnurlp_response_data(&first), Some(data));

        cache.delete_lnurlp_response_data(&first);
        assert!(cache.get_lnurlp_response_data(&first).is_none());
        assert!(cache.get_lnurlp_response_data(&second).is_some());
    }

    #[test]
    fn test_pay_req_entries() {
        let cache = SenderRequestCache::new();
        let now = Utc::now();
        let data = PayReqData {
            encoded_invoice: "lnbcrt1".to_string(),
            utxo_callback: None,
            invoice_data: InvoiceData {
                encoded_payment_request: "lnbcrt1".to_string(),
                bitcoin_network: Network::Regtest,
                payment_hash: "00".to_string(),
                amount: CurrencyAmount::msats(1_000),
                created_at: now,
                expires_at: now,
                memo: None,
                destination: None,
            },
        };
        cache.save_pay_req_data("uuid-1", data.clone());
        assert_eq!(cache.get_pay_req_data("uuid-1"), Some(data.clone()));
        assert_eq!(cache.take_pay_req_data("uuid-1"), Some(data));
        assert!(cache.get_pay_req_data("uuid-1").is_none());
        assert!(cache.take_pay_req_data("uuid-1").is_none());
    }
}
