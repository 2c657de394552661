//! Periodic reporting of counter deltas and runtime metrics.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;

/// Emits one stat line every `period` until `token` is cancelled.
///
/// Each line carries the counter deltas since the previous one (the
/// snapshot resets the counters) plus the process's physical memory use.
pub async fn run(broker: Broker, period: Duration, token: CancellationToken) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stat = broker.stat();
                let physical_mem = memory_stats::memory_stats()
                    .map(|usage| usage.physical_mem as u64)
                    .unwrap_or(0);
                info!(
                    inquire = stat.inquire,
                    inquire_fail = stat.inquire_fail,
                    inquire_timeout = stat.inquire_timeout,
                    store_timeout = stat.store_timeout,
                    worker_fail = stat.worker_fail,
                    physical_mem,
                    "monitor"
                );
            }
            () = token.cancelled() => break,
        }
    }
}
