//! Waiting for outgoing payments to settle.

use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::client_trait::LightsparkApi;
use crate::config::{backoff_delays, PaymentPollConfig};
use crate::error::Error;
use crate::model::OutgoingPayment;

/// Delays between status reads: `base_delay_ms` doubling up to `max_delay_ms`.
pub fn poll_delays(config: &PaymentPollConfig) -> impl Iterator<Item = Duration> {
    backoff_delays(config.base_delay_ms, config.max_delay_ms, config.max_attempts)
}

/// Reads `payment` until it is SUCCESS or FAILED.
///
/// Fails with `PaymentTimeout` once the attempts or the deadline run out. The
/// payment may still settle afterwards.
pub async fn wait_for_payment_completion<C>(
    client: &C,
    payment: OutgoingPayment,
    config: &PaymentPollConfig,
) -> Result<OutgoingPayment, Error>
where
    C: LightsparkApi + ?Sized,
{
    if payment.status.is_final() {
        return Ok(payment);
    }

    let poll = async {
        let mut delays = poll_delays(config);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let current = client
                .get_outgoing_payment(&payment.id)
                .await?
                .ok_or_else(|| Error::internal(format!("payment {} not found", payment.id)))?;
            if current.status.is_final() {
                return Ok(current);
            }
            tracing::debug!(
                "Payment {} is {:?} after {} reads",
                payment.id,
                current.status,
                attempt
            );
            match delays.next() {
                Some(delay) => sleep(delay).await,
                None => return Err(Error::PaymentTimeout),
            }
        }
    };

    timeout(Duration::from_secs(config.deadline_seconds), poll)
        .await
        .map_err(|_| Error::PaymentTimeout)?
}
