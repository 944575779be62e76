//! Bounded polling with an injectable clock.
//!
//! Every wait in the crate that cannot be event-driven (the provider
//! script appearing, in particular) goes through [`wait_until`] so the
//! cap is enforced in one place and tests can substitute a clock that
//! does not actually sleep.

use std::future::Future;
use std::time::Duration;

/// Source of delay between poll attempts.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Default clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Poll `probe` until it returns true, at most `attempts` times, sleeping
/// `interval` between attempts.
///
/// Returns the 1-based attempt number on success. On exhaustion returns
/// `Err(attempts)` so the caller can report how long it waited.
pub async fn wait_until<C, F>(
    clock: &C,
    attempts: u32,
    interval: Duration,
    mut probe: F,
) -> Result<u32, u32>
where
    C: Clock,
    F: FnMut() -> bool,
{
    for attempt in 1..=attempts {
        if probe() {
            return Ok(attempt);
        }
        if attempt < attempts {
            clock.sleep(interval).await;
        }
    }
    Err(attempts)
}
