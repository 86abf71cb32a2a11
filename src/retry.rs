//! Bounded exponential-backoff retry for async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as worth retrying or not.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

/// What the retry observer is told before each retry.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
  /// 1-based retry number
  pub attempt: u32,
  /// How long the policy will wait before this retry
  pub delay: Duration,
  /// The failure that triggered the retry
  pub error: &'a E,
}

/// Retry policy with doubling delays: `base`, `2 * base`, `4 * base`, ...
///
/// The policy is a plain value; concurrent `execute` calls share nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  base_delay: Duration,
  max_retries: u32,
}

impl RetryPolicy {
  pub const fn new(base_delay: Duration, max_retries: u32) -> Self {
    Self {
      base_delay,
      max_retries,
    }
  }

  /// 3 retries starting at 1 second.
  pub const fn tfs_default() -> Self {
    Self::new(Duration::from_secs(1), 3)
  }

  /// Delay before retry number `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor)
  }

  /// Run `op`, retrying transient failures and logging each retry as a warning.
  pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
  where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    self.execute_with(op, log_retry).await
  }

  /// Run `op`, retrying transient failures and reporting each retry to `on_retry`.
  ///
  /// Non-transient failures are returned immediately. Once the retries are
  /// used up the last failure is returned.
  pub async fn execute_with<T, E, F, Fut, O>(&self, mut op: F, mut on_retry: O) -> Result<T, E>
  where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(&RetryAttempt<'_, E>),
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(error) if error.is_transient() && attempt < self.max_retries => {
          attempt += 1;
          let delay = self.delay_for(attempt);
          on_retry(&RetryAttempt {
            attempt,
            delay,
            error: &error,
          });
          tokio::time::sleep(delay).await;
        }
        Err(error) => return Err(error),
      }
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::tfs_default()
  }
}

fn log_retry<E: Display>(retry: &RetryAttempt<'_, E>) {
  tracing::warn!(
    attempt = retry.attempt,
    delay_ms = u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
    error = %retry.error,
    "Retry attempt {} after {:?} due to: {}",
    retry.attempt,
    retry.delay,
    retry.error
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, PartialEq)]
  enum TestError {
    Flaky(u32),
    Fatal,
  }

  impl Transient for TestError {
    fn is_transient(&self) -> bool {
      matches!(self, TestError::Flaky(_))
    }
  }

  impl Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      write!(f, "{:?}", self)
    }
  }

  #[test]
  fn test_delays_double() {
    let policy = RetryPolicy::tfs_default();
    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(3), Duration::from_secs(4));
  }

  #[test]
  fn test_saturated_delay_is_still_logged() {
    let policy = RetryPolicy::new(Duration::MAX, 3);
    let delay = policy.delay_for(40);
    assert_eq!(delay, Duration::MAX);
    log_retry(&RetryAttempt {
      attempt: 40,
      delay,
      error: &TestError::Flaky(40),
    });
  }

  #[tokio::test(start_paused = true)]
  async fn test_succeeds_after_two_transient_failures() {
    let calls = AtomicU32::new(0);
    let mut observed = Vec::new();

    let result = RetryPolicy::tfs_default()
      .execute_with(
        || async {
          let n = calls.fetch_add(1, Ordering::SeqCst);
          if n < 2 {
            Err(TestError::Flaky(n))
          } else {
            Ok("done")
          }
        },
        |retry| observed.push((retry.attempt, retry.delay)),
      )
      .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
      observed,
      vec![(1, Duration::from_secs(1)), (2, Duration::from_secs(2))]
    );
    assert!(observed[1].1 > observed[0].1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_three_retries() {
    let calls = AtomicU32::new(0);
    let mut retries = 0;

    let result: Result<(), _> = RetryPolicy::tfs_default()
      .execute_with(
        || async { Err(TestError::Flaky(calls.fetch_add(1, Ordering::SeqCst))) },
        |_| retries += 1,
      )
      .await;

    assert_eq!(result, Err(TestError::Flaky(3)));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(retries, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fatal_error_is_not_retried() {
    let calls = AtomicU32::new(0);
    let mut retries = 0;

    let result: Result<(), _> = RetryPolicy::tfs_default()
      .execute_with(
        || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Err(TestError::Fatal)
        },
        |_| retries += 1,
      )
      .await;

    assert_eq!(result, Err(TestError::Fatal));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(retries, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_waits_for_backoff() {
    let start = tokio::time::Instant::now();
    let calls = AtomicU32::new(0);

    let _ = RetryPolicy::tfs_default()
      .execute(|| async {
        match calls.fetch_add(1, Ordering::SeqCst) {
          0 | 1 => Err(TestError::Flaky(0)),
          _ => Ok(()),
        }
      })
      .await;

    assert!(start.elapsed() >= Duration::from_secs(3));
  }
}
