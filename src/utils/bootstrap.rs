//! Bootstrap utilities for order-mesh binaries.

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{StartupConfig, LOG_ENV_VAR};

/// Initialize tracing from `ORDER_MESH_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Fixed-interval backoff for startup connections.
///
/// `attempts` counts the first try, so it allows `attempts - 1` retries.
pub fn startup_backoff(startup: &StartupConfig) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(startup.connect_delay())
        .with_max_times(startup.connect_attempts.saturating_sub(1))
}

/// Run `connect` until it succeeds or the startup attempts run out.
///
/// Each failure is logged; the last error is returned for the caller to
/// treat as fatal.
pub async fn connect_with_retry<T, E, F, Fut>(
    target: &str,
    startup: &StartupConfig,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(startup_backoff(startup))
        .notify(|err: &E, delay: Duration| {
            warn!(target_service = %target, error = %err, delay = ?delay, "Connection failed, retrying");
        })
        .await;

    match &result {
        Ok(_) => info!(target_service = %target, "Connected"),
        Err(e) => error!(
            target_service = %target,
            attempts = startup.connect_attempts,
            error = %e,
            "Giving up on connection"
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn startup(attempts: usize) -> StartupConfig {
        StartupConfig {
            connect_attempts: attempts,
            connect_delay_secs: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_configured_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = connect_with_retry("broker", &startup(12), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("refused".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "refused");
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_connected() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, String> = connect_with_retry("database", &startup(12), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("not yet".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }
}
