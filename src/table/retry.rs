use std::thread;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;

use crate::error::Error;
use crate::Result;

/// Bounded exponential back-off applied to storage operations. Only I/O failures are considered
/// transient; any other storage error is returned right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubled on every subsequent one.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy which gives up after the first failure.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }

    /// Delay before the attempt following `attempt`: half of the exponential step is fixed, the
    /// other half is random jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let step = self.base_delay
            .checked_mul(1u32 << (attempt - 1).min(16))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let half = step / 2;
        let spread = half.as_micros() as u64;
        let jitter = if spread > 0 { rand::thread_rng().gen_range(0, spread) } else { 0 };
        half + Duration::from_micros(jitter)
    }

    pub(crate) fn run<R, F>(&self, op: &'static str, mut f: F) -> Result<R>
        where F: FnMut() -> sled::Result<R> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f() {
                Ok(result) => return Ok(result),
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!("storage operation '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                          op, attempt, max_attempts, delay, e);
                    thread::sleep(delay);
                }
                Err(source) => {
                    error!("storage operation '{}' failed after {} attempt(s): {}", op, attempt, source);
                    return Err(Error::Storage { op, attempts: attempt, source });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

fn is_transient(e: &sled::Error) -> bool {
    matches!(e, sled::Error::Io(_))
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::table::RetryPolicy;
    use std::io;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn io_error() -> sled::Error {
        sled::Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted"))
    }

    #[test]
    fn retry_recovers_from_transient_errors() {
        let mut calls = 0;
        let result = policy(3).run("test", || {
            calls += 1;
            if calls < 3 { Err(io_error()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: crate::Result<()> = policy(4).run("test", || {
            calls += 1;
            Err(io_error())
        });
        assert_eq!(calls, 4);
        match result {
            Err(Error::Storage { op, attempts, .. }) => {
                assert_eq!(op, "test");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected storage error, got {:?}", other),
        }
    }

    #[test]
    fn retry_skips_non_transient_errors() {
        let mut calls = 0;
        let result: crate::Result<()> = policy(5).run("test", || {
            calls += 1;
            Err(sled::Error::Unsupported("unsupported".to_string()))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::Storage { attempts: 1, .. })));
    }

    #[test]
    fn retry_backoff_is_bounded() {
        let p = policy(10);
        for attempt in 1..10 {
            assert!(p.backoff(attempt) <= p.max_delay);
        }
        assert!(RetryPolicy::no_retry().max_attempts == 1);
    }
}
