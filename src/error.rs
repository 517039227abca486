use thiserror::Error;

use crate::crypto::CryptoError;

/// Coarse classification of [`Error`], used by callers that only need to know
/// how to react (reject input, retry, report to the counterparty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidInvoice,
    InvalidSignature,
    Replay,
    MissingField,
    InvalidNetwork,
    CounterpartyPubkeyFetchError,
    LnurlpRequestFailed,
    PayreqRequestFailed,
    NoCompatibleUmaVersion,
    InvoiceExpired,
    InternalError,
    Forbidden,
    DeclinedToSign,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing {0} environment variable")]
    MissingEnvVar(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid invoice: {0}")]
    InvalidInvoice(String),
    #[error("Invoice expired: {0}")]
    InvoiceExpired(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    #[error("Nonce replay detected: {0}")]
    Replay(String),
    #[error("missing {0} in webhook")]
    MissingField(String),
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
    #[error("Invalid or missing callback UUID")]
    InvalidUuid,
    #[error("Unsupported currency: {0}")]
    InvalidCurrency(String),
    #[error("Failed to fetch public keys for {domain}: {message}")]
    CounterpartyPubkeyFetch { domain: String, message: String },
    #[error("Failed response from receiver: {0}")]
    LnurlpRequestFailed(u16),
    #[error("Failed payreq response: {0}")]
    PayreqRequestFailed(u16),
    #[error("No compatible UMA version with VASP2")]
    NoCompatibleUmaVersion,
    #[error("Unsupported UMA version: {0}")]
    UnsupportedVersion(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("declined to sign messages")]
    DeclinedToSign,
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("payment timed out")]
    PaymentTimeout,
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("Request failed with status {status}: {message}")]
    Request { status: u16, message: String },
    #[error("{error_type}: {message}")]
    GraphQl { error_type: String, message: String },
    #[error("{0}")]
    GraphQlInternal(String),
    #[error("Signing key for node {0} is not loaded")]
    SigningKeyNotLoaded(String),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Failed to parse timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl Error {
    /// Creates a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a new MissingField error
    pub fn missing_field<S: Into<String>>(name: S) -> Self {
        Self::MissingField(name.into())
    }

    /// Creates a new InvalidSignature error
    pub fn invalid_signature<S: Into<String>>(message: S) -> Self {
        Self::InvalidSignature(message.into())
    }

    /// Creates a new Internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidUuid
            | Error::InvalidCurrency(_)
            | Error::InvalidQuery(_)
            | Error::InvalidBaseUrl(_)
            | Error::UnsupportedVersion(_)
            | Error::UrlParse(_)
            | Error::Timestamp(_)
            | Error::Json(_) => ErrorKind::InvalidInput,
            Error::InvalidInvoice(_) => ErrorKind::InvalidInvoice,
            Error::InvoiceExpired(_) => ErrorKind::InvoiceExpired,
            Error::InvalidSignature(_) | Error::SignatureMismatch => ErrorKind::InvalidSignature,
            Error::Replay(_) => ErrorKind::Replay,
            Error::MissingField(_) => ErrorKind::MissingField,
            Error::InvalidNetwork(_) | Error::Crypto(CryptoError::InvalidNetwork(_)) => {
                ErrorKind::InvalidNetwork
            }
            Error::CounterpartyPubkeyFetch { .. } => ErrorKind::CounterpartyPubkeyFetchError,
            Error::LnurlpRequestFailed(_) => ErrorKind::LnurlpRequestFailed,
            Error::PayreqRequestFailed(_) => ErrorKind::PayreqRequestFailed,
            Error::NoCompatibleUmaVersion => ErrorKind::NoCompatibleUmaVersion,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::DeclinedToSign => ErrorKind::DeclinedToSign,
            Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::Internal(_)
            | Error::PaymentTimeout
            | Error::Request { .. }
            | Error::GraphQl { .. }
            | Error::GraphQlInternal(_)
            | Error::SigningKeyNotLoaded(_)
            | Error::Crypto(_)
            | Error::Reqwest(_) => ErrorKind::InternalError,
        }
    }

    /// HTTP status a server should answer with when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput
            | ErrorKind::InvalidInvoice
            | ErrorKind::InvoiceExpired
            | ErrorKind::MissingField
            | ErrorKind::InvalidNetwork
            | ErrorKind::InvalidSignature
            | ErrorKind::Replay => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NoCompatibleUmaVersion => 412,
            ErrorKind::CounterpartyPubkeyFetchError
            | ErrorKind::LnurlpRequestFailed
            | ErrorKind::PayreqRequestFailed => 424,
            ErrorKind::DeclinedToSign | ErrorKind::InternalError => 500,
        }
    }

    /// Returns true for transient failures of the hosted service.
    ///
    /// Counterparty VASP failures are never retried here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Request { status, .. } => *status >= 500,
            Error::GraphQlInternal(_) => true,
            Error::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
