use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::ecdh::SharedSecret;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Scalar, Secp256k1, SecretKey};

use super::{sha256, CryptoError, MasterSeed, Network};

/// Offset added to a child index to make it hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Path of the node identity key used for ECDH and invoice signatures.
pub const NODE_KEY_PATH: &str = "m/0'";

/// Path of the key used to sign GraphQL requests on behalf of a remote-signing node.
pub const REQUEST_SIGNING_KEY_PATH: &str = "m/5";

/// Compact recoverable signature over an invoice hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSignature {
    pub signature: [u8; 64],
    pub recovery_id: i32,
}

/// Derive an extended private key along a `/`-separated path such as `m/84'/0'/0'`.
///
/// The first segment must be `m`. Segments ending in `'` are hardened. Indices
/// must fit below 2^31 before the hardening offset is applied.
pub fn derive_xpriv(seed: &MasterSeed, network: Network, path: &str) -> Result<Xpriv, CryptoError> {
    let mut segments = path.split('/');
    match segments.next() {
        Some("m") => {}
        Some(other) => return Err(CryptoError::invalid_path(other)),
        None => return Err(CryptoError::invalid_path(path)),
    }

    let mut children = Vec::new();
    for segment in segments {
        let (digits, offset) = match segment.strip_suffix('\'') {
            Some(stripped) => (stripped, HARDENED_OFFSET),
            None => (segment, 0),
        };
        let index: u32 = digits
            .parse()
            .map_err(|_| CryptoError::invalid_path(digits))?;
        if index >= HARDENED_OFFSET {
            return Err(CryptoError::invalid_path(digits));
        }
        children.push(ChildNumber::from(index + offset));
    }

    derive_xpriv_from_indices(seed, network, &children)
}

fn derive_xpriv_from_indices(
    seed: &MasterSeed,
    network: Network,
    children: &[ChildNumber],
) -> Result<Xpriv, CryptoError> {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(network.to_bitcoin(), seed.expose())?;
    Ok(master.derive_priv(&secp, &children)?)
}

/// Parse a derivation path into raw child indices, hardened indices carrying the offset.
///
/// Stricter than [`derive_xpriv`]: the path must start with `m/` and contain no
/// empty components.
pub fn parse_derivation_path(path: &str) -> Result<Vec<u32>, CryptoError> {
    let rest = path.strip_prefix("m/").ok_or_else(|| {
        CryptoError::InvalidDerivationPath("derivation path must start with 'm/'".to_string())
    })?;

    rest.split('/')
        .map(|segment| {
            if segment.is_empty() {
                return Err(CryptoError::InvalidDerivationPath(
                    "empty component".to_string(),
                ));
            }
            let (digits, offset) = match segment.strip_suffix('\'') {
                Some(stripped) => (stripped, HARDENED_OFFSET),
                None => (segment, 0),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| CryptoError::invalid_path(digits))?;
            if index >= HARDENED_OFFSET {
                return Err(CryptoError::invalid_path(digits));
            }
            Ok(index + offset)
        })
        .collect()
}

/// Split a path into its leading run of hardened indices and the remaining indices.
pub fn split_derivation_path(path: &str) -> Result<(Vec<u32>, Vec<u32>), CryptoError> {
    let indices = parse_derivation_path(path)?;
    let split_at = indices
        .iter()
        .position(|index| *index < HARDENED_OFFSET)
        .unwrap_or(indices.len());
    let remainder = indices[split_at..].to_vec();
    let mut hardened = indices;
    hardened.truncate(split_at);
    Ok((hardened, remainder))
}

/// Derive the extended public key at `path` and serialize it for `network` (`xpub…` or `tpub…`).
pub fn derive_xpub_hardened(
    seed: &MasterSeed,
    path: &[u32],
    network: Network,
) -> Result<String, CryptoError> {
    let children: Vec<ChildNumber> = path.iter().map(|index| ChildNumber::from(*index)).collect();
    let xpriv = derive_xpriv_from_indices(seed, network, &children)?;
    let secp = Secp256k1::new();
    Ok(Xpub::from_priv(&secp, &xpriv).to_string())
}

/// Derive a child public key from a serialized extended public key.
///
/// Only non-hardened indices are accepted.
pub fn derive_child_pubkey(xpub: &str, path: &[u32]) -> Result<PublicKey, CryptoError> {
    if let Some(index) = path.iter().find(|index| **index >= HARDENED_OFFSET) {
        return Err(CryptoError::HardenedDerivation(*index));
    }
    let parent = Xpub::from_str(xpub)?;
    let children: Vec<ChildNumber> = path.iter().map(|index| ChildNumber::from(*index)).collect();
    let secp = Secp256k1::verification_only();
    Ok(parent.derive_pub(&secp, &children)?.public_key)
}

pub fn derive_private_key(
    seed: &MasterSeed,
    network: Network,
    path: &str,
) -> Result<SecretKey, CryptoError> {
    Ok(derive_xpriv(seed, network, path)?.private_key)
}

pub fn derive_public_key(
    seed: &MasterSeed,
    network: Network,
    path: &str,
) -> Result<PublicKey, CryptoError> {
    let secp = Secp256k1::signing_only();
    Ok(derive_private_key(seed, network, path)?.public_key(&secp))
}

/// ECDH between the node identity key and a peer public key.
pub fn ecdh(
    seed: &MasterSeed,
    network: Network,
    peer_pubkey: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let peer = PublicKey::from_slice(peer_pubkey)?;
    let node_key = derive_private_key(seed, network, NODE_KEY_PATH)?;
    Ok(SharedSecret::new(&peer, &node_key).secret_bytes())
}

fn scalar_from_slice(bytes: &[u8], name: &str) -> Result<Scalar, CryptoError> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::invalid_key(format!("{name} must be 32 bytes")))?;
    Scalar::from_be_bytes(array)
        .map_err(|_| CryptoError::invalid_key(format!("{name} is out of range")))
}

/// Derive the key at `derivation_path`, apply `k' = mul·k + add`, and sign `message`.
///
/// When `is_raw` is set the message is already a 32-byte digest; otherwise it is
/// hashed with SHA-256 first. Returns the 64-byte compact signature.
pub fn derive_key_and_sign(
    seed: &MasterSeed,
    network: Network,
    message: &[u8],
    derivation_path: &str,
    is_raw: bool,
    add_tweak: Option<&[u8]>,
    mul_tweak: Option<&[u8]>,
) -> Result<[u8; 64], CryptoError> {
    let mut key = derive_private_key(seed, network, derivation_path)?;
    if let Some(mul) = mul_tweak {
        key = key.mul_tweak(&scalar_from_slice(mul, "mul_tweak")?)?;
    }
    if let Some(add) = add_tweak {
        key = key.add_tweak(&scalar_from_slice(add, "add_tweak")?)?;
    }

    let digest = if is_raw {
        Message::from_digest_slice(message)?
    } else {
        Message::from_digest(sha256(message))
    };

    let secp = Secp256k1::signing_only();
    Ok(secp.sign_ecdsa(&digest, &key).serialize_compact())
}

/// Sign a 32-byte invoice hash with the node identity key, returning a recoverable signature.
pub fn sign_invoice_hash(
    seed: &MasterSeed,
    network: Network,
    hash: &[u8],
) -> Result<InvoiceSignature, CryptoError> {
    let key = derive_private_key(seed, network, NODE_KEY_PATH)?;
    let message = Message::from_digest_slice(hash)?;
    let secp = Secp256k1::signing_only();
    let (recovery_id, signature) = secp
        .sign_ecdsa_recoverable(&message, &key)
        .serialize_compact();
    Ok(InvoiceSignature {
        signature,
        recovery_id: recovery_id.to_i32(),
    })
}

/// ECDSA over SHA-256(payload), DER encoded.
pub fn sign_ecdsa(key: &SecretKey, payload: &[u8]) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(sha256(payload));
    secp.sign_ecdsa(&message, key).serialize_der().to_vec()
}

/// Verify a DER ECDSA signature over SHA-256(payload).
///
/// The public key may be compressed or uncompressed. High-S signatures are
/// normalized before verification.
pub fn verify_ecdsa(pubkey: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key = PublicKey::from_slice(pubkey)?;
    let mut signature = Signature::from_der(signature)?;
    signature.normalize_s();
    let message = Message::from_digest(sha256(payload));
    let secp = Secp256k1::verification_only();
    Ok(secp.verify_ecdsa(&message, &signature, &key)?)
}

/// Hardened prefix `m/84'/<coin>'/0'` of the L1 wallet for a network.
pub fn l1_wallet_derivation_prefix(network: Network) -> [u32; 3] {
    [
        84 + HARDENED_OFFSET,
        network.l1_coin_type() + HARDENED_OFFSET,
        HARDENED_OFFSET,
    ]
}

/// Serialized account xpub of the L1 wallet, used when registering a remote-signing node.
pub fn derive_l1_wallet_hardened_xpub(
    seed: &MasterSeed,
    network: Network,
) -> Result<String, CryptoError> {
    derive_xpub_hardened(seed, &l1_wallet_derivation_prefix(network), network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> MasterSeed {
        MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
    }

    #[test]
    fn test_derive_xpriv_requires_m_root() {
        let err = derive_xpriv(&seed(), Network::Mainnet, "n/0").unwrap_err();
        assert_eq!(err.to_string(), "invalid path: n");
    }

    #[test]
    fn test_derive_xpriv_rejects_non_numeric_segment() {
        let err = derive_xpriv(&seed(), Network::Mainnet, "m/0'/x").unwrap_err();
        assert_eq!(err.to_string(), "invalid path: x");
    }

    #[test]
    fn test_derive_xpriv_rejects_oversized_hardened_index() {
        assert!(derive_xpriv(&seed(), Network::Mainnet, "m/2147483648'").is_err());
        assert!(derive_xpriv(&seed(), Network::Mainnet, "m/2147483647'").is_ok());
    }

    #[test]
    fn test_derive_xpriv_matches_index_derivation() {
        let from_path = derive_xpriv(&seed(), Network::Mainnet, "m/0'/1").unwrap();
        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, &from_path).to_string();
        let from_indices = derive_xpub_hardened(&seed(), &[HARDENED_OFFSET, 1], Network::Mainnet)
            .unwrap();
        assert_eq!(xpub, from_indices);
    }

    #[test]
    fn test_parse_derivation_path() {
        assert_eq!(
            parse_derivation_path("m/84'/0'/0'/0/1").unwrap(),
            vec![84 + HARDENED_OFFSET, HARDENED_OFFSET, HARDENED_OFFSET, 0, 1]
        );
    }

    #[test]
    fn test_parse_derivation_path_errors() {
        assert_eq!(
            parse_derivation_path("84'/0'").unwrap_err().to_string(),
            "invalid derivation path: derivation path must start with 'm/'"
        );
        assert_eq!(
            parse_derivation_path("m/").unwrap_err().to_string(),
            "invalid derivation path: empty component"
        );
        assert_eq!(
            parse_derivation_path("m//1/2").unwrap_err().to_string(),
            "invalid derivation path: empty component"
        );
        assert_eq!(
            parse_derivation_path("m/abc").unwrap_err().to_string(),
            "invalid path: abc"
        );
    }

    #[test]
    fn test_split_derivation_path() {
        let (hardened, rest) = split_derivation_path("m/3'/1'/7/8").unwrap();
        assert_eq!(hardened, vec![3 + HARDENED_OFFSET, 1 + HARDENED_OFFSET]);
        assert_eq!(rest, vec![7, 8]);

        let (hardened, rest) = split_derivation_path("m/3/2104864975").unwrap();
        assert!(hardened.is_empty());
        assert_eq!(rest, vec![3, 2104864975]);
    }

    #[test]
    fn test_derive_child_pubkey_rejects_hardened() {
        let xpub = derive_xpub_hardened(&seed(), &[HARDENED_OFFSET], Network::Mainnet).unwrap();
        let err = derive_child_pubkey(&xpub, &[1, HARDENED_OFFSET]).unwrap_err();
        assert!(matches!(err, CryptoError::HardenedDerivation(_)));
    }

    #[test]
    fn test_derive_child_pubkey_matches_private_derivation() {
        let xpub = derive_xpub_hardened(&seed(), &[HARDENED_OFFSET], Network::Mainnet).unwrap();
        let child = derive_child_pubkey(&xpub, &[1, 2]).unwrap();
        let expected = derive_public_key(&seed(), Network::Mainnet, "m/0'/1/2").unwrap();
        assert_eq!(child, expected);
    }

    #[test]
    fn test_ecdh_is_symmetric() {
        let other = MasterSeed::from_hex("fffcf9f6f3f0edeae7e4e1dedbd8d5d2").unwrap();
        let our_pub = derive_public_key(&seed(), Network::Regtest, NODE_KEY_PATH).unwrap();
        let their_pub = derive_public_key(&other, Network::Regtest, NODE_KEY_PATH).unwrap();

        let ours = ecdh(&seed(), Network::Regtest, &their_pub.serialize()).unwrap();
        let theirs = ecdh(&other, Network::Regtest, &our_pub.serialize()).unwrap();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_derive_key_and_sign_applies_tweaks() {
        let secp = Secp256k1::new();
        let message = sha256(b"hello");
        let mut add = [0u8; 32];
        add[31] = 5;
        let mut mul = [0u8; 32];
        mul[31] = 3;

        let signature = derive_key_and_sign(
            &seed(),
            Network::Regtest,
            &message,
            "m/3'/1/2",
            true,
            Some(&add),
            Some(&mul),
        )
        .unwrap();

        let base = derive_private_key(&seed(), Network::Regtest, "m/3'/1/2").unwrap();
        let tweaked = base
            .mul_tweak(&Scalar::from_be_bytes(mul).unwrap())
            .unwrap()
            .add_tweak(&Scalar::from_be_bytes(add).unwrap())
            .unwrap();

        let signature = Signature::from_compact(&signature).unwrap();
        let digest = Message::from_digest(message);
        assert!(secp
            .verify_ecdsa(&digest, &signature, &tweaked.public_key(&secp))
            .is_ok());
        assert!(secp
            .verify_ecdsa(&digest, &signature, &base.public_key(&secp))
            .is_err());
    }

    #[test]
    fn test_derive_key_and_sign_raw_requires_digest() {
        let err = derive_key_and_sign(&seed(), Network::Regtest, b"short", "m/0", true, None, None)
            .unwrap_err();
        assert!(matches!(err, CryptoError::Secp256k1(_)));
    }

    #[test]
    fn test_sign_invoice_hash_recovers_node_key() {
        use bitcoin::secp256k1::ecdsa::{RecoverableSignature, RecoveryId};

        let hash = sha256(b"invoice");
        let signed = sign_invoice_hash(&seed(), Network::Mainnet, &hash).unwrap();
        let recovery_id = RecoveryId::from_i32(signed.recovery_id).unwrap();
        let recoverable =
            RecoverableSignature::from_compact(&signed.signature, recovery_id).unwrap();
        let secp = Secp256k1::new();
        let recovered = secp
            .recover_ecdsa(&Message::from_digest(hash), &recoverable)
            .unwrap();
        assert_eq!(
            recovered,
            derive_public_key(&seed(), Network::Mainnet, NODE_KEY_PATH).unwrap()
        );
    }

    #[test]
    fn test_sign_and_verify_ecdsa() {
        let key = derive_private_key(&seed(), Network::Regtest, REQUEST_SIGNING_KEY_PATH).unwrap();
        let secp = Secp256k1::signing_only();
        let pubkey = key.public_key(&secp);

        let signature = sign_ecdsa(&key, b"$bob@vasp2.com|1234|1700000000");
        assert!(verify_ecdsa(&pubkey.serialize(), b"$bob@vasp2.com|1234|1700000000", &signature).is_ok());
        assert!(verify_ecdsa(
            &pubkey.serialize_uncompressed(),
            b"$bob@vasp2.com|1234|1700000000",
            &signature
        )
        .is_ok());
        assert!(verify_ecdsa(&pubkey.serialize(), b"tampered", &signature).is_err());
    }
}
