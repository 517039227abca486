use thiserror::Error;

/// Errors raised by the key derivation, signing and key unwrap primitives.
///
/// None of the variants ever carries seed or private key material; messages
/// name the failing input (a path segment, a version number) and nothing more.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A derivation path segment could not be parsed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A derivation path is structurally malformed (missing `m/` prefix, empty component).
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// A hardened index was requested where only public derivation is possible.
    #[error("hardened derivation is not supported for public keys: index {0}")]
    HardenedDerivation(u32),

    #[error("invalid master seed: {0}")]
    InvalidSeed(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid bitcoin network: {0}")]
    InvalidNetwork(String),

    #[error("BIP-32 error: {0}")]
    Bip32(#[from] bitcoin::bip32::Error),

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),

    #[error("hex parsing failed: {0}")]
    HexParse(#[from] hex::FromHexError),

    #[error("base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The stored key header names a version outside 0..=4.
    #[error("unknown version: {0}")]
    UnsupportedCipherVersion(i64),

    #[error("invalid cipher header: {0}")]
    InvalidCipherHeader(String),

    /// Decryption failed, which includes a wrong password.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid PSBT: {0}")]
    Psbt(String),

    #[error("ECIES error: {0}")]
    Ecies(String),

    #[error("{0}")]
    NoMatch(String),

    #[error("{0}")]
    ScriptMismatch(String),

    #[error("signing error: {0}")]
    Signing(String),
}

impl CryptoError {
    /// Creates a new InvalidPath error
    pub fn invalid_path<S: Into<String>>(segment: S) -> Self {
        Self::InvalidPath(segment.into())
    }

    /// Creates a new InvalidKey error
    pub fn invalid_key<S: Into<String>>(message: S) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Creates a new Decryption error
    pub fn decryption<S: Into<String>>(message: S) -> Self {
        Self::Decryption(message.into())
    }

    /// Creates a new InvalidTransaction error
    pub fn invalid_transaction<S: Into<String>>(message: S) -> Self {
        Self::InvalidTransaction(message.into())
    }

    /// Returns true if the error was caused by malformed key material rather than bad input data
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKey(_)
                | CryptoError::InvalidSeed(_)
                | CryptoError::Secp256k1(_)
                | CryptoError::Bip32(_)
        )
    }
}

impl From<bitcoin::consensus::encode::Error> for CryptoError {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        CryptoError::InvalidTransaction(err.to_string())
    }
}

impl From<bitcoin::psbt::Error> for CryptoError {
    fn from(err: bitcoin::psbt::Error) -> Self {
        CryptoError::Psbt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let error = CryptoError::invalid_path("abc");
        assert_eq!(error.to_string(), "invalid path: abc");
    }

    #[test]
    fn test_invalid_derivation_path_display() {
        let error = CryptoError::InvalidDerivationPath("empty component".to_string());
        assert_eq!(
            error.to_string(),
            "invalid derivation path: empty component"
        );
    }

    #[test]
    fn test_unknown_version_display() {
        assert_eq!(
            CryptoError::UnsupportedCipherVersion(7).to_string(),
            "unknown version: 7"
        );
    }

    #[test]
    fn test_no_match_is_bare_message() {
        let error = CryptoError::NoMatch("no match found".to_string());
        assert_eq!(error.to_string(), "no match found");
        assert!(!error.is_key_error());
    }

    #[test]
    fn test_hex_error_conversion() {
        let hex_err = hex::decode("zz").unwrap_err();
        let error: CryptoError = hex_err.into();
        assert!(matches!(error, CryptoError::HexParse(_)));
        assert!(error.to_string().starts_with("hex parsing failed"));
    }

    #[test]
    fn test_key_errors() {
        assert!(CryptoError::invalid_key("bad").is_key_error());
        assert!(!CryptoError::decryption("bad tag").is_key_error());
    }
}
