use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::{derive_private_key, sha256, CryptoError, MasterSeed, Network};

const PREIMAGE_KEY_PATH: &str = "m/4'";
const PREIMAGE_DOMAIN: &[u8] = b"invoice preimage";

/// Fresh random 32-byte nonce from which an invoice preimage is later re-derived.
pub fn generate_preimage_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Deterministic preimage for `nonce`: the first 32 bytes of
/// HMAC-SHA512(key at `m/4'`, "invoice preimage" || nonce).
pub fn generate_preimage(seed: &MasterSeed, nonce: &[u8]) -> Result<[u8; 32], CryptoError> {
    // The preimage key does not depend on the network; only the private scalar is used.
    let key = derive_private_key(seed, Network::Mainnet, PREIMAGE_KEY_PATH)?;
    let key_bytes = Zeroizing::new(key.secret_bytes());

    let mut mac = Hmac::<Sha512>::new_from_slice(key_bytes.as_ref())
        .map_err(|e| CryptoError::invalid_key(e.to_string()))?;
    mac.update(PREIMAGE_DOMAIN);
    mac.update(nonce);
    let output = mac.finalize().into_bytes();

    let mut preimage = [0u8; 32];
    preimage.copy_from_slice(&output[..32]);
    Ok(preimage)
}

/// SHA-256 of [`generate_preimage`].
pub fn generate_preimage_hash(seed: &MasterSeed, nonce: &[u8]) -> Result<[u8; 32], CryptoError> {
    let preimage = Zeroizing::new(generate_preimage(seed, nonce)?);
    Ok(sha256(preimage.as_ref()))
}
