use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::client_trait::LightsparkApi;
use crate::crypto::{decrypt_stored_key, MasterSeed, Network};
use crate::error::Error;
use crate::model::EncryptedSigningKey;
use crate::queries::RECOVER_NODE_SIGNING_KEY_QUERY;
use crate::requester::SigningKey;

/// Password of every REGTEST node's operation signing key.
pub const REGTEST_SIGNING_KEY_PASSWORD: &str = "1234!@#$";

#[derive(Debug)]
enum KeySource {
    MasterSeed { seed: MasterSeed, network: Network },
    NodePassword { node_id: String, password: String },
    Loaded,
}

/// Loads the key that signs fund-moving GraphQL operations of a node.
///
/// The unwrapped key is memoized; the lock is held for the whole load, so
/// concurrent first use unwraps once.
#[derive(Debug)]
pub struct SigningKeyLoader {
    source: KeySource,
    cached: Mutex<Option<SigningKey>>,
}

impl SigningKeyLoader {
    /// For remote-signing nodes: the secp256k1 key at `m/5` of the master seed.
    pub fn from_master_seed(seed: MasterSeed, network: Network) -> Self {
        Self {
            source: KeySource::MasterSeed { seed, network },
            cached: Mutex::new(None),
        }
    }

    /// For OSK nodes whose PKCS#8 RSA key is already at hand.
    pub fn from_rsa_private_key(pkcs8_der: Vec<u8>) -> Self {
        Self {
            source: KeySource::Loaded,
            cached: Mutex::new(Some(SigningKey::rsa(pkcs8_der))),
        }
    }

    /// For OSK nodes: fetches the encrypted key of `node_id` and unwraps it with
    /// the node password ([`REGTEST_SIGNING_KEY_PASSWORD`] on REGTEST).
    pub fn from_node_password(node_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            source: KeySource::NodePassword {
                node_id: node_id.into(),
                password: password.into(),
            },
            cached: Mutex::new(None),
        }
    }

    pub async fn load<C>(&self, client: &C) -> Result<SigningKey, Error>
    where
        C: LightsparkApi + ?Sized,
    {
        let mut cached = self.cached.lock().await;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match &self.source {
            KeySource::MasterSeed { seed, network } => {
                SigningKey::from_master_seed(seed, *network)?
            }
            KeySource::NodePassword { node_id, password } => {
                tracing::debug!("Recovering signing key for node {}", node_id);
                let data = client
                    .execute_graphql(
                        RECOVER_NODE_SIGNING_KEY_QUERY,
                        json!({ "node_id": node_id }),
                    )
                    .await?;
                let encrypted = encrypted_key_from(data)
                    .ok_or_else(|| Error::SigningKeyNotLoaded(node_id.clone()))?;
                let der = decrypt_stored_key(
                    &encrypted.cipher,
                    &encrypted.encrypted_value,
                    password,
                )?;
                SigningKey::RsaPssSha256(der)
            }
            KeySource::Loaded => {
                return Err(Error::internal("signing key loader has no key source"))
            }
        };

        *cached = Some(key.clone());
        Ok(key)
    }
}

fn encrypted_key_from(mut data: Value) -> Option<EncryptedSigningKey> {
    let key = data
        .get_mut("entity")?
        .get_mut("encrypted_signing_private_key")?
        .take();
    serde_json::from_value(key).ok()
}
