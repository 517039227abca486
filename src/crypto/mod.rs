//! # Crypto
//!
//! Key derivation, signing and key unwrap primitives used by the remote-signing
//! engine, the request signer and the UMA flows.
//!
//! Everything here is a pure function of its inputs. The BIP-32 master seed is
//! wrapped in [`MasterSeed`], which keeps the bytes in a [`secrecy::SecretVec`]
//! so that they never show up in `Debug` output, logs or error messages.
//!
//! ```rust,no_run
//! use lightspark_rs::crypto::{self, MasterSeed, Network};
//!
//! # fn main() -> Result<(), lightspark_rs::crypto::CryptoError> {
//! let seed = MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f")?;
//! let xpub = crypto::derive_xpub_hardened(&seed, &[0x8000_0000], Network::Mainnet)?;
//! println!("{xpub}");
//! # Ok(())
//! # }
//! ```

pub mod commitment;
pub mod ecies;
pub mod error;
pub mod key_unwrap;
pub mod keys;
pub mod preimage;
pub mod sighash;

use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretVec};
use serde::{Deserialize, Serialize};

pub use commitment::{per_commitment_point, release_per_commitment_secret};
pub use error::CryptoError;
pub use key_unwrap::decrypt_stored_key;
pub use keys::{
    derive_child_pubkey, derive_key_and_sign, derive_private_key, derive_public_key,
    derive_xpriv, derive_xpub_hardened, ecdh, parse_derivation_path, sign_ecdsa,
    sign_invoice_hash, split_derivation_path, verify_ecdsa, InvoiceSignature,
};
pub use preimage::{generate_preimage, generate_preimage_hash, generate_preimage_nonce};
pub use sighash::{get_payment_hash_from_script, psbt_witness_hash, segwit_witness_hash};

/// Bitcoin network a node or key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// The `rust-bitcoin` network used for key serialization.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Coin type used in the `m/84'/<coin>'/0'` L1 wallet prefix.
    pub fn l1_coin_type(self) -> u32 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
            Network::Regtest => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "MAINNET",
            Network::Testnet => "TESTNET",
            Network::Regtest => "REGTEST",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAINNET" => Ok(Network::Mainnet),
            "TESTNET" => Ok(Network::Testnet),
            "REGTEST" => Ok(Network::Regtest),
            other => Err(CryptoError::InvalidNetwork(other.to_string())),
        }
    }
}

/// BIP-32 root seed.
///
/// Accepts 16 to 64 bytes, the range BIP-32 allows. Node seeds are 32 to 64
/// bytes; 16 is the BIP-32 minimum, as in test vector 1. The bytes are only
/// reachable through [`MasterSeed::expose`], and both `Debug` and `Clone`
/// avoid copying them into anything that could be printed.
pub struct MasterSeed(SecretVec<u8>);

impl MasterSeed {
    pub const MIN_LEN: usize = 16;
    pub const MAX_LEN: usize = 64;

    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() < Self::MIN_LEN || bytes.len() > Self::MAX_LEN {
            return Err(CryptoError::InvalidSeed(format!(
                "expected {} to {} bytes, got {}",
                Self::MIN_LEN,
                Self::MAX_LEN,
                bytes.len()
            )));
        }
        Ok(Self(SecretVec::new(bytes)))
    }

    pub fn from_hex(hex_seed: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_seed.trim())
            .map_err(|_| CryptoError::InvalidSeed("seed is not valid hex".to_string()))?;
        Self::new(bytes)
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl Clone for MasterSeed {
    fn clone(&self) -> Self {
        Self(SecretVec::new(self.expose().to_vec()))
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSeed([REDACTED])")
    }
}

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}
