//! # UMA
//!
//! Universal Money Address protocol primitives shared by the sending and the
//! receiving VASP: address grammar, version negotiation, the four signed wire
//! messages and the replay and key caches both sides keep.
//!
//! The caches are plain values owned by whoever serves the protocol; nothing in
//! this module is process-global.

pub mod address;
pub mod messages;
pub mod nonce_cache;
pub mod protocol;
pub mod public_key_cache;
pub mod version;

pub use address::{
    get_vasp_domain_from_uma_address, is_domain_localhost, is_uma_address, validate_uma_address,
};
pub use messages::{
    get_lnurlp_response, get_pay_req_response, get_pay_request, get_post_transaction_callback,
    get_signed_lnurlp_request_url, verify_pay_req_response_signature, verify_pay_req_signature,
    verify_post_transaction_callback_signature, verify_uma_lnurlp_query_signature,
    verify_uma_lnurlp_response_signature, LnurlpResponseParams, PayReqResponseParams,
    PayRequestParams,
};
pub use nonce_cache::InMemoryNonceCache;
pub use protocol::{
    CompliancePayerData, ConvertibleCurrency, CounterPartyDataOption, CounterPartyDataOptions,
    Currency, KycStatus, LnurlComplianceResponse, LnurlpRequest, LnurlpResponse, PayReqResponse,
    PayReqResponseCompliance, PayReqResponsePaymentInfo, PayRequest, PayerData,
    PostTransactionCallback, PubKeyResponse, UnsupportedVersionResponse, UtxoWithAmount,
};
pub use public_key_cache::{fetch_public_key_for_vasp, InMemoryPublicKeyCache};
pub use version::{
    get_supported_major_versions_from_error_response_body, is_version_supported,
    select_highest_supported_version, select_lower_version, ParsedVersion, SupportedVersions,
    UMA_PROTOCOL_VERSION,
};
