//! # VASP roles
//!
//! [`UmaSender`] drives an outbound payment through lookup, pay request and
//! confirmation. [`UmaReceiver`] answers the counterparty side for a single
//! configured user. Both share a public-key cache and a nonce cache owned by
//! the server that hosts them.

pub mod receiver;
pub mod request_cache;
pub mod sender;

pub use receiver::{receiver_currencies, UmaReceiver};
pub use request_cache::{LnurlpResponseData, PayReqData, SenderRequestCache};
pub use sender::{LookupResult, PayReqParams, PayReqResult, SendPaymentResult, UmaSender};
