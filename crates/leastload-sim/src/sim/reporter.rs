use crate::sim::telemetry::record_load_variance;
use core::time::Duration;
use leastload::Balancer;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Logs the pool's load distribution every `period` until `shutdown_token`
/// fires.
pub async fn report_loop<I, O>(
    balancer: Balancer<I, O>,
    period: Duration,
    shutdown_token: CancellationToken,
) where
    I: Send + 'static,
    O: Send + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match balancer.snapshot().await {
            Ok(stats) => {
                record_load_variance(stats.variance);
                tracing::info!(
                    total = stats.total,
                    inflight = balancer.inflight(),
                    "{stats}"
                );
            }
            Err(e) => {
                tracing::debug!("Reporter stopping: {e}");
                break;
            }
        }
    }
}
