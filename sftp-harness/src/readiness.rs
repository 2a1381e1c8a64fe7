//! Bounded polling
//!
//! Container IP assignment and sshd bind-up happen after `run` returns, so
//! anything that talks to the container first polls here with a fixed
//! interval and a fixed attempt budget.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::ReadinessConfig;
use crate::container::ContainerHandle;
use crate::error::{HarnessError, HarnessResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub description: String,
    pub max_attempts: u32,
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl WaitConfig {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            max_attempts: 30,
            interval: Duration::from_secs(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Abort the wait as soon as `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

impl From<&ReadinessConfig> for WaitConfig {
    fn from(config: &ReadinessConfig) -> Self {
        WaitConfig::with_description(format!("port {}", config.port))
            .max_attempts(config.max_attempts)
            .interval(Duration::from_millis(config.interval_ms))
    }
}

/// Poll `check` until it returns `true`.
///
/// Errors from `check` end the wait immediately. Exhausting the budget
/// yields [`HarnessError::Timeout`], cancellation [`HarnessError::Cancelled`].
pub async fn wait_for<F, Fut>(config: WaitConfig, mut check: F) -> HarnessResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    for attempt in 1..=config.max_attempts {
        if config.cancel.is_cancelled() {
            return Err(HarnessError::Cancelled(config.description));
        }

        if check().await? {
            tracing::debug!("{} ready after {} attempt(s)", config.description, attempt);
            return Ok(());
        }

        if attempt % 5 == 0 {
            tracing::info!(
                "Still waiting for {}... (attempt {}/{})",
                config.description,
                attempt,
                config.max_attempts
            );
        }

        if attempt < config.max_attempts {
            tokio::select! {
                _ = config.cancel.cancelled() => {
                    return Err(HarnessError::Cancelled(config.description));
                }
                _ = sleep(config.interval) => {}
            }
        }
    }

    Err(HarnessError::Timeout(config.description))
}

/// Single TCP connect attempt.
pub async fn port_open(host: &str, port: u16) -> bool {
    matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Wait until the container has an address and `port` accepts connections.
///
/// Returns `false` on timeout or cancellation; callers must check it before
/// driving the container any further.
pub async fn wait_for_open_port(
    container: &ContainerHandle,
    port: u16,
    config: WaitConfig,
) -> HarnessResult<bool> {
    tracing::info!("Waiting for {}:{} to accept connections...", container.name(), port);

    let result = wait_for(config, move || async move {
        let ip = container.inspect_ip().await?;
        if ip.is_empty() {
            return Ok(false);
        }
        Ok(port_open(&ip, port).await)
    })
    .await;

    match result {
        Ok(()) => Ok(true),
        Err(HarnessError::Timeout(what)) | Err(HarnessError::Cancelled(what)) => {
            tracing::warn!("{} on {} never became ready", what, container.name());
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
