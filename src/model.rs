use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Network;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrencyUnit {
    Bitcoin,
    Satoshi,
    Millisatoshi,
    Usd,
    Mxn,
    Php,
    Nanobitcoin,
    Microbitcoin,
    Millibitcoin,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub original_value: i64,
    pub original_unit: CurrencyUnit,
}

impl CurrencyAmount {
    pub fn msats(value: i64) -> Self {
        Self {
            original_value: value,
            original_unit: CurrencyUnit::Millisatoshi,
        }
    }

    /// Converts a bitcoin-denominated amount to millisatoshis.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for fiat units and on overflow.
    pub fn to_msats(&self) -> Result<i64, Error> {
        let multiplier: i64 = match self.original_unit {
            CurrencyUnit::Bitcoin => 100_000_000_000,
            CurrencyUnit::Millibitcoin => 100_000_000,
            CurrencyUnit::Microbitcoin => 100_000,
            CurrencyUnit::Satoshi => 1_000,
            CurrencyUnit::Nanobitcoin => 100,
            CurrencyUnit::Millisatoshi => 1,
            other => {
                return Err(Error::invalid_input(format!(
                    "cannot convert {:?} to millisatoshis",
                    other
                )))
            }
        };
        self.original_value
            .checked_mul(multiplier)
            .ok_or_else(|| Error::invalid_input("amount overflows millisatoshis"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
    NotStarted,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReference {
    pub id: Option<String>,
    pub public_key: Option<String>,
}

/// Decoded BOLT-11 invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub encoded_payment_request: String,
    pub bitcoin_network: Network,
    pub payment_hash: String,
    pub amount: CurrencyAmount,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub destination: Option<NodeReference>,
}

impl InvoiceData {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    pub data: InvoiceData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransactionData {
    pub utxo: String,
    pub amount: CurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPayment {
    pub id: String,
    pub status: TransactionStatus,
    pub amount: CurrencyAmount,
    #[serde(default)]
    pub fees: Option<CurrencyAmount>,
    #[serde(default)]
    pub uma_post_transaction_data: Option<Vec<PostTransactionData>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub encoded_offer: String,
}

/// Signing key of an OSK node, wrapped with the node password.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EncryptedSigningKey {
    pub encrypted_value: String,
    pub cipher: String,
}
