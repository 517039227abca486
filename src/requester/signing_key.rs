use std::fmt;

use bitcoin::secp256k1::SecretKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::keys::REQUEST_SIGNING_KEY_PATH;
use crate::crypto::{self, CryptoError, MasterSeed, Network};

/// Key used to sign GraphQL request envelopes for operations that move funds.
#[derive(Clone)]
pub enum SigningKey {
    /// PKCS#8 DER encoded RSA private key, signs with RSA-PSS over SHA-256
    RsaPssSha256(Zeroizing<Vec<u8>>),
    /// secp256k1 key at `m/5` of a remote-signing node, signs with DER ECDSA over SHA-256
    Secp256k1(SecretKey),
}

impl SigningKey {
    pub fn rsa(pkcs8_der: Vec<u8>) -> Self {
        Self::RsaPssSha256(Zeroizing::new(pkcs8_der))
    }

    /// Derives the request signing key of a remote-signing node.
    pub fn from_master_seed(seed: &MasterSeed, network: Network) -> Result<Self, CryptoError> {
        Ok(Self::Secp256k1(crypto::derive_private_key(
            seed,
            network,
            REQUEST_SIGNING_KEY_PATH,
        )?))
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            SigningKey::RsaPssSha256(der) => {
                let key = RsaPrivateKey::from_pkcs8_der(der)
                    .map_err(|e| CryptoError::invalid_key(e.to_string()))?;
                let signer = BlindedSigningKey::<Sha256>::new(key);
                let signature = signer
                    .try_sign_with_rng(&mut rand::thread_rng(), payload)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(signature.to_vec())
            }
            SigningKey::Secp256k1(key) => Ok(crypto::sign_ecdsa(key, payload)),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKey::RsaPssSha256(_) => f.write_str("SigningKey::RsaPssSha256([REDACTED])"),
            SigningKey::Secp256k1(_) => f.write_str("SigningKey::Secp256k1([REDACTED])"),
        }
    }
}
