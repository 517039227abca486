//! BOLT-3 per-commitment secret derivation.
//!
//! The channel seed is SHA-256 of the private key at the channel's derivation
//! path. The commitment seed is SHA-256(channel seed || "commitment seed"), and
//! the secret for index `idx` is produced by the BOLT-3 bit-flip-and-hash walk
//! over the 48 low bits of `idx`.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use super::{derive_private_key, sha256, CryptoError, MasterSeed, Network};

const COMMITMENT_SEED_DOMAIN: &[u8] = b"commitment seed";

fn commitment_seed(
    seed: &MasterSeed,
    network: Network,
    derivation_path: &str,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let key = derive_private_key(seed, network, derivation_path)?;
    let channel_seed = Zeroizing::new(sha256(&key.secret_bytes()));

    let mut preimage = Zeroizing::new(Vec::with_capacity(32 + COMMITMENT_SEED_DOMAIN.len()));
    preimage.extend_from_slice(channel_seed.as_ref());
    preimage.extend_from_slice(COMMITMENT_SEED_DOMAIN);
    Ok(Zeroizing::new(sha256(&preimage)))
}

fn build_commitment_secret(commitment_seed: &[u8; 32], index: u64) -> [u8; 32] {
    let mut secret = *commitment_seed;
    for bitpos in (0..48u64).rev() {
        if index & (1 << bitpos) != 0 {
            secret[(bitpos / 8) as usize] ^= 1 << (bitpos & 7);
            secret = sha256(&secret);
        }
    }
    secret
}

/// Per-commitment secret for `index` on the channel rooted at `derivation_path`.
pub fn release_per_commitment_secret(
    seed: &MasterSeed,
    network: Network,
    derivation_path: &str,
    index: u64,
) -> Result<[u8; 32], CryptoError> {
    let commitment_seed = commitment_seed(seed, network, derivation_path)?;
    Ok(build_commitment_secret(&commitment_seed, index))
}

/// Compressed public key of [`release_per_commitment_secret`].
pub fn per_commitment_point(
    seed: &MasterSeed,
    network: Network,
    derivation_path: &str,
    index: u64,
) -> Result<[u8; 33], CryptoError> {
    let secret = Zeroizing::new(release_per_commitment_secret(
        seed,
        network,
        derivation_path,
        index,
    )?);
    let key = SecretKey::from_slice(secret.as_ref())?;
    let secp = Secp256k1::signing_only();
    Ok(PublicKey::from_secret_key(&secp, &key).serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> MasterSeed {
        MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
    }

    #[test]
    fn test_commitment_point_matches_released_secret() {
        let path = "m/3/2104864975";
        let index = 281474976710654;

        let secret = release_per_commitment_secret(&seed(), Network::Mainnet, path, index).unwrap();
        let point = per_commitment_point(&seed(), Network::Mainnet, path, index).unwrap();

        let secp = Secp256k1::signing_only();
        let expected =
            PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&secret).unwrap()).serialize();
        assert_eq!(point, expected);
    }

    // BOLT-3 "generate_from_seed" vectors.
    #[test]
    fn test_bolt3_generate_from_seed_vectors() {
        let zero = [0u8; 32];
        assert_eq!(
            hex::encode(build_commitment_secret(&zero, 281474976710655)),
            "02a40c85b6f28da08dfdbe0926c53fab2de6d28c10301f8f7c4073d5e42e3148"
        );

        let ff = [0xffu8; 32];
        assert_eq!(
            hex::encode(build_commitment_secret(&ff, 281474976710655)),
            "7cc854b54e3e0dcdb010d7a3fee464a9687be6e8db3be6854c475621e007a5dc"
        );
        assert_eq!(
            hex::encode(build_commitment_secret(&ff, 0xaaaaaaaaaaa)),
            "56f4008fb007ca9acf0e15b054d5c9fd12ee06cea347914ddbaed70d1c13a528"
        );
        assert_eq!(
            hex::encode(build_commitment_secret(&ff, 0x555555555555)),
            "9015daaeb06dba4ccc05b91b2f73bd54405f2be9f217fbacd3c5ac2e62327d31"
        );
    }

    #[test]
    fn test_index_zero_returns_commitment_seed() {
        let seed_bytes = [7u8; 32];
        assert_eq!(build_commitment_secret(&seed_bytes, 0), seed_bytes);
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        assert!(release_per_commitment_secret(&seed(), Network::Mainnet, "x/1", 1).is_err());
    }
}
