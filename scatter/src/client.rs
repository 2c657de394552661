//! Shared outbound HTTP client factory.

use std::time::Duration;

use crate::config::Config;
use crate::error::Error;

/// Idle connections kept per downstream host when no handler limit is
/// configured.
const DEFAULT_MAX_IDLE: usize = 100;

fn idle_per_host(max_handlers: i32) -> usize {
    if max_handlers > 0 {
        max_handlers as usize
    } else {
        DEFAULT_MAX_IDLE
    }
}

/// Builds the one client every fan-out job shares.
///
/// The 20 s client timeout is an absolute envelope per call; endpoint
/// timeouts are applied separately by the dispatcher and usually fire
/// first.
pub(crate) fn new_client(config: &Config) -> Result<reqwest::Client, Error> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(idle_per_host(config.max_handlers))
        .timeout(Duration::from_secs(20))
        .build()?;
    Ok(client)
}
