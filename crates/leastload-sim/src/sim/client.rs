use crate::sim::telemetry::{increment_errors, increment_requests, record_latency};
use core::time::Duration;
use leastload::{Balancer, Error};
use rand::Rng;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Exclusive upper bound of the integers clients submit.
const MAX_PAYLOAD: i32 = 90;

/// One synthetic client: pause for a random delay, submit a random integer,
/// wait for its sine, repeat until `shutdown_token` fires or the balancer
/// stops accepting work.
pub async fn client_loop(
    client_id: usize,
    balancer: Balancer<i32, f64>,
    max_delay: Duration,
    shutdown_token: CancellationToken,
) {
    tracing::trace!("Client {client_id} started");
    let max_delay_us = u64::try_from(max_delay.as_micros()).unwrap_or(u64::MAX).max(1);

    loop {
        // ThreadRng is not Send; keep it out of the awaits below.
        let (delay, payload) = {
            let mut rng = rand::rng();
            (
                Duration::from_micros(rng.random_range(0..max_delay_us)),
                rng.random_range(0..MAX_PAYLOAD),
            )
        };

        tokio::select! {
            () = shutdown_token.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        increment_requests();
        let start = Instant::now();
        match balancer.submit(payload).await {
            Ok(result) => {
                record_latency(start.elapsed().as_secs_f64() * 1_000.0);
                tracing::trace!("Client {client_id}: sin({payload}) = {result:.4}");
            }
            Err(Error::ServiceShutdown) => break,
            Err(e) => {
                increment_errors();
                tracing::warn!("Client {client_id} request failed: {e}");
            }
        }
    }

    tracing::trace!("Client {client_id} stopped");
}
