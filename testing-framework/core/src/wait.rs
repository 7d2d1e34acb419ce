use std::{error::Error, fmt, future::Future, time::Duration};

use tokio::time::{Instant, sleep};

use crate::adjust_timeout;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long and how often to check a readiness condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessPolicy {
    interval: Duration,
    timeout: Duration,
}

impl ReadinessPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ReadinessPolicy {
    /// 2s between checks, 1 minute overall (doubled on slow test hosts).
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, adjust_timeout(DEFAULT_TIMEOUT))
    }
}

/// The polled condition was not observed before the deadline.
#[derive(Debug)]
pub struct PollTimeoutError<E> {
    timeout: Duration,
    attempts: u32,
    last_error: Option<E>,
}

impl<E> PollTimeoutError<E> {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Fetch error seen on the final attempt, if that attempt failed.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }
}

impl<E: fmt::Display> fmt::Display for PollTimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out waiting for the condition after {:?} ({} attempts)",
            self.timeout, self.attempts
        )?;
        if let Some(err) = &self.last_error {
            write!(f, "; last error: {err}")?;
        }
        Ok(())
    }
}

impl<E> Error for PollTimeoutError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last_error.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

/// Checks `condition` immediately, then every `interval`, until it reports
/// `true` or the next check would start after `timeout` has elapsed.
///
/// A check that errors counts as "not yet". A check landing exactly on the
/// deadline still runs.
pub async fn poll_until<F, Fut, E>(
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<(), PollTimeoutError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let started = Instant::now();
    let mut attempts = 0_u32;

    loop {
        attempts += 1;
        let last_error = match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => None,
            Err(err) => Some(err),
        };

        let next_check = started.elapsed().checked_add(interval);
        if next_check.is_none_or(|next_check| next_check > timeout) {
            return Err(PollTimeoutError {
                timeout,
                attempts,
                last_error,
            });
        }

        sleep(interval).await;
    }
}
