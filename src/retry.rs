//! Fixed exponential backoff for flaky node calls.
//!
//! Attempt `i` (0-based) that fails is followed by a sleep of
//! `base_delay * 2^i`, except after the final attempt. No jitter.

use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Single attempt, never sleeps.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Delay to wait after failed attempt `attempt` (0-based).
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    // cap the shift so a silly max_attempts can't overflow
    let factor = 1u32 << attempt.min(16);
    policy.base_delay.saturating_mul(factor)
}

/// Retry every error until the attempt budget runs out.
pub async fn with_retry<T, E, F, Fut>(label: &str, policy: RetryPolicy, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(label, policy, |_| true, op).await
}

/// Like [`with_retry`], but errors rejected by `should_retry` are returned
/// immediately.
pub async fn with_retry_if<T, E, F, Fut, P>(
    label: &str,
    policy: RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let last = attempt + 1 >= attempts;
                if last || !should_retry(&e) {
                    log::warn!("[retry] {label} giving up after {} attempt(s): {e}", attempt + 1);
                    return Err(e);
                }
                let back = backoff_delay(&policy, attempt);
                log::warn!(
                    "[retry] {label} attempt={} backoff={}ms : {e}",
                    attempt + 1,
                    back.as_millis()
                );
                sleep(back).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, Once};

    static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct Capture;

    impl log::Log for Capture {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn capture_warnings() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = log::set_logger(&Capture);
            log::set_max_level(log::LevelFilter::Warn);
        });
    }

    fn warnings_for(label: &str) -> Vec<String> {
        WARNINGS
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.contains(label))
            .cloned()
            .collect()
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(backoff_delay(&p, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&p, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&p, 3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let policy = RetryPolicy::new(5, Duration::from_millis(100));

        let out: Result<&str, String> = with_retry("flaky", policy, || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("boom {n}"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(out, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_runs_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = tokio::time::Instant::now();

        let out: Result<(), String> =
            with_retry("dead", RetryPolicy::new(4, Duration::from_millis(50)), || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("fail {n}")) }
            })
            .await;

        assert_eq!(out, Err("fail 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 50 + 100 + 200, nothing after the last attempt
        assert_eq!(start.elapsed(), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_return_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let out: Result<(), String> = with_retry_if(
            "lookup",
            RetryPolicy::default(),
            |e: &String| e != "not found",
            || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err("not found".to_string()) }
            },
        )
        .await;

        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let _: Result<(), String> = with_retry("zero", RetryPolicy::new(0, Duration::ZERO), || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err("x".to_string()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_failed_attempt_is_logged() {
        capture_warnings();
        let _: Result<(), String> =
            with_retry("one-shot-fetch", RetryPolicy::new(1, Duration::ZERO), || async {
                Err("refused".to_string())
            })
            .await;
        let _: Result<(), String> = with_retry_if(
            "rejected-fetch",
            RetryPolicy::default(),
            |_| false,
            || async { Err("bad input".to_string()) },
        )
        .await;

        let one = warnings_for("one-shot-fetch");
        assert_eq!(one.len(), 1);
        assert!(one[0].contains("refused"));
        assert_eq!(warnings_for("rejected-fetch").len(), 1);
    }
}
