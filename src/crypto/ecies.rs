//! ECIES over secp256k1, used to encrypt travel-rule information to a
//! counterparty VASP's encryption key.
//!
//! Wire format matches the `ecies` crate default configuration:
//! `ephemeral_pubkey (65, uncompressed) || nonce (16) || tag (16) || ciphertext`,
//! with the symmetric key derived by HKDF-SHA256 over
//! `ephemeral_pubkey || shared_point` (both uncompressed).

use aes::Aes256;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::AesGcm;
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::CryptoError;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const NONCE_SIZE: usize = 16;
const TAG_SIZE: usize = 16;
const PUBKEY_SIZE: usize = 65;
const HEADER_SIZE: usize = PUBKEY_SIZE + NONCE_SIZE + TAG_SIZE;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::Ecies(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// HKDF-SHA256 with a zero salt and empty info, expanded to one block.
fn hkdf_sha256(ikm: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let prk = Zeroizing::new(hmac_sha256(&[0u8; 32], ikm)?);
    Ok(Zeroizing::new(hmac_sha256(prk.as_ref(), &[1u8])?))
}

fn shared_key(
    ephemeral: &PublicKey,
    peer: &PublicKey,
    scalar: &SecretKey,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let secp = Secp256k1::verification_only();
    let shared_point = peer
        .mul_tweak(&secp, &Scalar::from(*scalar))
        .map_err(|_| CryptoError::Ecies("invalid public key".to_string()))?;

    let mut ikm = Zeroizing::new([0u8; PUBKEY_SIZE * 2]);
    ikm[..PUBKEY_SIZE].copy_from_slice(&ephemeral.serialize_uncompressed());
    ikm[PUBKEY_SIZE..].copy_from_slice(&shared_point.serialize_uncompressed());
    hkdf_sha256(ikm.as_ref())
}

fn random_secret_key() -> SecretKey {
    let mut rng = rand::thread_rng();
    let mut bytes = Zeroizing::new([0u8; 32]);
    loop {
        rng.fill_bytes(bytes.as_mut());
        if let Ok(key) = SecretKey::from_slice(bytes.as_ref()) {
            return key;
        }
    }
}

/// Encrypt `message` to `receiver_pubkey` (compressed or uncompressed SEC1 bytes).
pub fn encrypt(receiver_pubkey: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let receiver = PublicKey::from_slice(receiver_pubkey)
        .map_err(|_| CryptoError::Ecies("invalid public key".to_string()))?;
    let secp = Secp256k1::signing_only();
    let ephemeral_secret = random_secret_key();
    let ephemeral = PublicKey::from_secret_key(&secp, &ephemeral_secret);
    let key = shared_key(&ephemeral, &receiver, &ephemeral_secret)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut out = Vec::with_capacity(HEADER_SIZE + message.len());
    out.extend_from_slice(&ephemeral.serialize_uncompressed());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&[0u8; TAG_SIZE]);
    out.extend_from_slice(message);

    let cipher = Aes256Gcm16::new_from_slice(key.as_ref())
        .map_err(|e| CryptoError::Ecies(e.to_string()))?;
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut out[HEADER_SIZE..])
        .map_err(|_| CryptoError::Ecies("encryption failed".to_string()))?;
    out[PUBKEY_SIZE + NONCE_SIZE..HEADER_SIZE].copy_from_slice(tag.as_slice());
    Ok(out)
}

/// Decrypt a message produced by [`encrypt`] with the receiver's private key.
pub fn decrypt(receiver_secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let secret = SecretKey::from_slice(receiver_secret)
        .map_err(|_| CryptoError::Ecies("invalid secret key".to_string()))?;
    if ciphertext.len() < HEADER_SIZE {
        return Err(CryptoError::Ecies("invalid message".to_string()));
    }

    let ephemeral = PublicKey::from_slice(&ciphertext[..PUBKEY_SIZE])
        .map_err(|_| CryptoError::Ecies("invalid public key".to_string()))?;
    let key = shared_key(&ephemeral, &ephemeral, &secret)?;
    let nonce = &ciphertext[PUBKEY_SIZE..PUBKEY_SIZE + NONCE_SIZE];
    let tag = &ciphertext[PUBKEY_SIZE + NONCE_SIZE..HEADER_SIZE];

    let mut plaintext = ciphertext[HEADER_SIZE..].to_vec();
    Aes256Gcm16::new_from_slice(key.as_ref())
        .map_err(|e| CryptoError::Ecies(e.to_string()))?
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            &mut plaintext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::Ecies("decryption failed".to_string()))?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(i: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = i;
        SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_hkdf_known_vector() {
        assert_eq!(
            hex::encode::<&[u8]>(hkdf_sha256(b"secret").unwrap().as_ref()),
            "2f34e5ff91ec85d53ca9b543683174d0cf550b60d5f52b24c97b386cfcf6cbbf"
        );
    }

    #[test]
    fn test_shared_key_known_vector() {
        let secp = Secp256k1::new();
        let ephemeral_secret = secret(2);
        let ephemeral = PublicKey::from_secret_key(&secp, &ephemeral_secret);
        let receiver = PublicKey::from_secret_key(&secp, &secret(3));

        let key = shared_key(&ephemeral, &receiver, &ephemeral_secret).unwrap();
        assert_eq!(
            hex::encode::<&[u8]>(key.as_ref()),
            "6f982d63e8590c9d9b5b4c1959ff80315d772edd8f60287c9361d548d5200f82"
        );
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let secp = Secp256k1::new();
        let receiver_secret = secret(7);
        let receiver = PublicKey::from_secret_key(&secp, &receiver_secret);

        let ciphertext = encrypt(&receiver.serialize(), b"travel rule info").unwrap();
        assert_eq!(ciphertext.len(), HEADER_SIZE + 16);
        let plaintext = decrypt(&receiver_secret.secret_bytes(), &ciphertext).unwrap();
        assert_eq!(plaintext, b"travel rule info");
    }

    #[test]
    fn test_wrong_key_fails() {
        let secp = Secp256k1::new();
        let receiver = PublicKey::from_secret_key(&secp, &secret(7));
        let ciphertext = encrypt(&receiver.serialize_uncompressed(), b"hello").unwrap();
        let err = decrypt(&secret(8).secret_bytes(), &ciphertext).unwrap_err();
        assert_eq!(err.to_string(), "ECIES error: decryption failed");
    }

    #[test]
    fn test_truncated_message() {
        let err = decrypt(&secret(7).secret_bytes(), &[4u8; 40]).unwrap_err();
        assert_eq!(err.to_string(), "ECIES error: invalid message");
    }
}
