//! Signing gates consulted before any key material is used.

use crate::crypto::{psbt_witness_hash, segwit_witness_hash, CryptoError};
use crate::webhooks::WebhookEvent;

use super::request::{parse_signing_request, SigningJob, SigningRequest};

/// Decides whether a remote-signing webhook may be signed.
///
/// `xpubs` holds, for every signing job of the event, the mainnet xpub at the
/// hardened prefix of the job's derivation path, so a host can check that the
/// requested keys belong to wallets it controls. Closures with the same shape
/// implement this trait.
pub trait Validator: Send + Sync {
    fn should_sign(&self, event: &WebhookEvent, xpubs: &[String]) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&WebhookEvent, &[String]) -> bool + Send + Sync,
{
    fn should_sign(&self, event: &WebhookEvent, xpubs: &[String]) -> bool {
        self(event, xpubs)
    }
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveValidator;

impl Validator for PositiveValidator {
    fn should_sign(&self, _event: &WebhookEvent, _xpubs: &[String]) -> bool {
        true
    }
}

/// Approves every sub-event except `DERIVE_KEY_AND_SIGN` batches whose messages
/// do not match the sighash recomputed from the transaction they claim to sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashValidator;

impl Validator for HashValidator {
    fn should_sign(&self, event: &WebhookEvent, _xpubs: &[String]) -> bool {
        let request = match parse_signing_request(event) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Refusing to sign unparseable webhook {}: {}", event.event_id, e);
                return false;
            }
        };
        match request {
            SigningRequest::DeriveKeyAndSign(request) => {
                request.signing_jobs.iter().all(|job| match job_matches(job) {
                    Ok(true) => true,
                    Ok(false) => {
                        tracing::warn!(
                            "Signing job {} message does not match its transaction",
                            job.id
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!("Could not validate signing job {}: {}", job.id, e);
                        false
                    }
                })
            }
            _ => true,
        }
    }
}

fn job_matches(job: &SigningJob) -> Result<bool, CryptoError> {
    let missing = |field: &str| CryptoError::invalid_transaction(format!("missing {field}"));
    let transaction = job.transaction.as_deref().ok_or_else(|| missing("transaction"))?;

    let expected = if job.is_psbt() {
        psbt_witness_hash(transaction)?
    } else {
        let script = job.script.as_deref().ok_or_else(|| missing("script"))?;
        let amount = job.amount.ok_or_else(|| missing("amount"))?;
        let amount = u64::try_from(amount)
            .map_err(|_| CryptoError::invalid_transaction(format!("negative amount {amount}")))?;
        segwit_witness_hash(amount, script, transaction)?
    };
    Ok(expected.eq_ignore_ascii_case(&job.message))
}
