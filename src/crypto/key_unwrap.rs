//! Unwrap of node signing keys stored encrypted by the hosted service.
//!
//! | v    | salt            | iv / nonce                  | mode        |
//! |------|-----------------|-----------------------------|-------------|
//! | 0, 1 | first 8 bytes   | derived (16 bytes)          | AES-256-CBC |
//! | 2    | first 8 bytes   | derived (16 bytes)          | AES-256-GCM |
//! | 3    | last 8 bytes    | first 12 bytes of the blob  | AES-256-GCM |
//! | 4    | first 16 bytes  | derived (12 bytes)          | AES-256-GCM |
//!
//! Keys are PBKDF2-HMAC-SHA256 with the iteration count from the header.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes::Aes256;
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::{ArrayLength, GenericArray};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::AesGcm;
use base64::Engine;
use serde_json::Value;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::CryptoError;

/// Cipher tag used by keys wrapped before versioned headers existed.
pub const LEGACY_CIPHER: &str = "AES_256_CBC_PBKDF2_5000_SHA256";

const KEY_LEN: usize = 32;
const AES_BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CipherHeader {
    version: i64,
    iterations: u32,
}

fn parse_header(cipher: &str) -> Result<CipherHeader, CryptoError> {
    if cipher == LEGACY_CIPHER {
        return Ok(CipherHeader {
            version: 0,
            iterations: 5000,
        });
    }

    let header: Value = serde_json::from_str(cipher)
        .map_err(|e| CryptoError::InvalidCipherHeader(e.to_string()))?;

    let mut version = header
        .get("v")
        .and_then(Value::as_i64)
        .ok_or_else(|| CryptoError::InvalidCipherHeader("missing v".to_string()))?;
    if header.get("lsv").and_then(Value::as_i64) == Some(2) {
        version = 3;
    }
    if !(0..=4).contains(&version) {
        return Err(CryptoError::UnsupportedCipherVersion(version));
    }

    let iterations = header
        .get("i")
        .and_then(Value::as_u64)
        .and_then(|i| u32::try_from(i).ok())
        .filter(|i| *i > 0)
        .ok_or_else(|| CryptoError::InvalidCipherHeader("missing i".to_string()))?;

    Ok(CipherHeader {
        version,
        iterations,
    })
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Zeroizing<Vec<u8>> {
    let mut derived = Zeroizing::new(vec![0u8; len]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut derived);
    derived
}

fn decrypt_gcm<N: ArrayLength<u8>>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != N::USIZE {
        return Err(CryptoError::decryption("nonce has the wrong length"));
    }
    let cipher = AesGcm::<Aes256, N>::new_from_slice(key)
        .map_err(|e| CryptoError::decryption(e.to_string()))?;
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::decryption("authentication failed"))
}

fn decrypt_cbc(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // The first block of a CBC blob is not part of the message.
    if ciphertext.len() < 2 * AES_BLOCK_LEN || ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::decryption("ciphertext has an invalid length"));
    }
    cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
        .map_err(|e| CryptoError::decryption(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext[AES_BLOCK_LEN..])
        .map_err(|_| CryptoError::decryption("invalid padding"))
}

/// Decrypt a signing key wrapped with `password`.
///
/// `cipher` is either [`LEGACY_CIPHER`] or a JSON header `{"v":…, "i":…, "lsv":…}`;
/// `encrypted` is the standard base64 blob returned by the hosted service.
pub fn decrypt_stored_key(
    cipher: &str,
    encrypted: &str,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let header = parse_header(cipher)?;
    let mut decoded = base64::engine::general_purpose::STANDARD.decode(encrypted.trim())?;
    if cipher == LEGACY_CIPHER {
        if decoded.len() < 8 {
            return Err(CryptoError::decryption("blob is too short"));
        }
        decoded.drain(..8);
    }

    if header.version == 3 {
        if decoded.len() < 12 + 8 {
            return Err(CryptoError::decryption("blob is too short"));
        }
        let (nonce, rest) = decoded.split_at(12);
        let (ciphertext, salt) = rest.split_at(rest.len() - 8);
        let key = pbkdf2_sha256(password.as_bytes(), salt, header.iterations, KEY_LEN);
        return decrypt_gcm::<U12>(&key, nonce, ciphertext).map(Zeroizing::new);
    }

    let (salt_len, iv_len) = if header.version < 4 { (8, 16) } else { (16, 12) };
    if decoded.len() < salt_len {
        return Err(CryptoError::decryption("blob is too short"));
    }
    let (salt, ciphertext) = decoded.split_at(salt_len);
    let derived = pbkdf2_sha256(
        password.as_bytes(),
        salt,
        header.iterations,
        KEY_LEN + iv_len,
    );
    let (key, iv) = derived.split_at(KEY_LEN);

    let plaintext = match header.version {
        0 | 1 => decrypt_cbc(key, iv, ciphertext)?,
        2 => decrypt_gcm::<U16>(key, iv, ciphertext)?,
        _ => decrypt_gcm::<U12>(key, iv, ciphertext)?,
    };
    Ok(Zeroizing::new(plaintext))
}
