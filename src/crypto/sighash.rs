use bitcoin::blockdata::opcodes::all::{OP_EQUALVERIFY, OP_HASH160};
use bitcoin::blockdata::script::Instruction;
use bitcoin::consensus::encode::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::key::CompressedPublicKey;
use bitcoin::psbt::Psbt;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, Script, ScriptBuf, Transaction};

use super::CryptoError;

/// BIP-143 sighash (SIGHASH_ALL) of input 0 of a raw transaction, hex encoded.
///
/// `script_hex` is the witness script used as scriptCode and `amount_sats`
/// the value of the spent output.
pub fn segwit_witness_hash(
    amount_sats: u64,
    script_hex: &str,
    transaction_hex: &str,
) -> Result<String, CryptoError> {
    let tx: Transaction = deserialize(&hex::decode(transaction_hex)?)?;
    let script = ScriptBuf::from_bytes(hex::decode(script_hex)?);
    bip143_hash(&tx, &script, Amount::from_sat(amount_sats))
}

/// BIP-143 sighash of input 0 of a PSBT, using the input's witness script and witness UTXO value.
pub fn psbt_witness_hash(psbt_hex: &str) -> Result<String, CryptoError> {
    let psbt = Psbt::deserialize(&hex::decode(psbt_hex)?)?;
    let input = psbt
        .inputs
        .first()
        .ok_or_else(|| CryptoError::Psbt("PSBT has no inputs".to_string()))?;
    let witness_script = input
        .witness_script
        .as_ref()
        .ok_or_else(|| CryptoError::Psbt("input 0 has no witness script".to_string()))?;
    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or_else(|| CryptoError::Psbt("input 0 has no witness utxo".to_string()))?;
    bip143_hash(&psbt.unsigned_tx, witness_script, utxo.value)
}

fn bip143_hash(tx: &Transaction, script: &Script, value: Amount) -> Result<String, CryptoError> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(0, script, value, EcdsaSighashType::All)
        .map_err(|e| CryptoError::invalid_transaction(e.to_string()))?;
    Ok(hex::encode(sighash.to_byte_array()))
}

/// Extract the 20-byte payment hash from an HTLC script
/// (`OP_HASH160 <hash> OP_EQUALVERIFY`), lowercase hex.
pub fn get_payment_hash_from_script(script_hex: &str) -> Result<String, CryptoError> {
    let script = ScriptBuf::from_bytes(hex::decode(script_hex)?);
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CryptoError::invalid_transaction(e.to_string()))?;

    instructions
        .windows(3)
        .find_map(|window| match window {
            [Instruction::Op(first), Instruction::PushBytes(hash), Instruction::Op(last)]
                if *first == OP_HASH160 && *last == OP_EQUALVERIFY && hash.len() == 20 =>
            {
                Some(hex::encode(hash.as_bytes()))
            }
            _ => None,
        })
        .ok_or_else(|| CryptoError::NoMatch("no match found".to_string()))
}

/// P2WPKH script (`OP_0 <hash160(pubkey)>`) paying to a compressed public key.
pub fn generate_p2wpkh_from_pubkey(pubkey: &[u8]) -> Result<ScriptBuf, CryptoError> {
    let key = CompressedPublicKey::from_slice(pubkey)
        .map_err(|e| CryptoError::invalid_key(e.to_string()))?;
    Ok(ScriptBuf::new_p2wpkh(&key.wpubkey_hash()))
}

pub fn decode_transaction(transaction_hex: &str) -> Result<Transaction, CryptoError> {
    Ok(deserialize(&hex::decode(transaction_hex)?)?)
}

/// Check that output 0 pays to `expected`.
pub fn validate_output_script(tx: &Transaction, expected: &Script) -> Result<(), CryptoError> {
    let output = tx
        .output
        .first()
        .ok_or_else(|| CryptoError::ScriptMismatch("no output found".to_string()))?;
    if output.script_pubkey.as_script() != expected {
        return Err(CryptoError::ScriptMismatch("scripts do not match".to_string()));
    }
    Ok(())
}

/// Check that output 1, the change output, pays to `expected`.
pub fn validate_change_script(tx: &Transaction, expected: &Script) -> Result<(), CryptoError> {
    let output = tx
        .output
        .get(1)
        .ok_or_else(|| CryptoError::ScriptMismatch("no change output found".to_string()))?;
    if output.script_pubkey.as_script() != expected {
        return Err(CryptoError::ScriptMismatch("scripts do not match".to_string()));
    }
    Ok(())
}
