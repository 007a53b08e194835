use tracing::warn;

use crate::{config::RetryPolicy, model::fs::FSError, util::context::Context};

/// Runs `op` until it succeeds, the policy's attempts run out, or `ctx` fires.
///
/// Errors for which `retryable` returns false are surfaced immediately.
/// On exhaustion the last error is returned.
pub fn retry<T, F, P>(ctx: &Context, policy: &RetryPolicy, retryable: P, mut op: F) -> Result<T, FSError>
where
    F: FnMut(u32) -> Result<T, FSError>,
    P: Fn(&FSError) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        ctx.err()?;

        let err = match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable(&err) || attempt + 1 >= attempts {
            return Err(err);
        }

        let delay = policy.delay(attempt);
        warn!(error_message=%err, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying");
        ctx.sleep(delay)?;

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use crate::util::context::ContextError;

    use super::*;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(4),
        }
    }

    fn transient() -> FSError {
        FSError::Backend {
            operation: "copy_object",
            location: "mem://b/k".to_string(),
            message: "503".to_string(),
        }
    }

    #[test]
    fn test_retry_until_success() {
        let ctx = Context::background();
        let mut calls = 0;

        let res = retry(&ctx, &fast_policy(5), |_| true, |_| {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok(calls)
            }
        });

        assert_eq!(res.unwrap(), 3);
    }

    #[test]
    fn test_retry_returns_last_error() {
        let ctx = Context::background();
        let mut calls = 0;

        let res: Result<(), FSError> = retry(&ctx, &fast_policy(5), |_| true, |attempt| {
            calls += 1;
            Err(FSError::Backend {
                operation: "copy_object",
                location: format!("attempt-{}", attempt),
                message: "503".to_string(),
            })
        });

        assert_eq!(calls, 5);
        assert!(res.unwrap_err().to_string().contains("attempt-4"));
    }

    #[test]
    fn test_retry_skips_permanent_errors() {
        let ctx = Context::background();
        let mut calls = 0;

        let res: Result<(), FSError> = retry(&ctx, &fast_policy(5), |err| !err.is_not_found(), |_| {
            calls += 1;
            Err(FSError::NotFound {
                location: "mem://b/k".to_string(),
            })
        });

        assert_eq!(calls, 1);
        assert!(res.unwrap_err().is_not_found());
    }

    #[test]
    fn test_retry_observes_cancellation() {
        let ctx = Context::background();
        let remote = ctx.clone();
        let policy = RetryPolicy {
            attempts: 5,
            initial_delay: Duration::from_secs(10),
            multiplier: 1,
            max_delay: Duration::from_secs(10),
        };

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let started = Instant::now();
        let res: Result<(), FSError> = retry(&ctx, &policy, |_| true, |_| Err(transient()));
        handle.join().unwrap();

        assert!(matches!(
            res,
            Err(FSError::Context(ContextError::Cancelled))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
