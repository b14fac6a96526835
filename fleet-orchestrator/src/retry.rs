use fleet_config::PollSettings;
use std::time::Duration;

/// Blocks the calling thread between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-interval polling, optionally bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` keeps polling until the probe succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// Call `probe` until it yields a value, sleeping `interval` between
    /// attempts. Returns `Ok(None)` once the attempt bound is exhausted;
    /// errors from `probe` end polling immediately.
    pub fn poll<T, E, F>(&self, sleeper: &dyn Sleeper, mut probe: F) -> Result<Option<T>, E>
    where
        F: FnMut(u32) -> Result<Option<T>, E>,
    {
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            if let Some(value) = probe(attempt)? {
                return Ok(Some(value));
            }
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return Ok(None);
            }
            sleeper.sleep(self.interval);
        }
    }
}

impl From<&PollSettings> for RetryPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            max_attempts: settings.max_attempts,
        }
    }
}

/// Records requested sleeps instead of sleeping.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(duration);
    }
}
