//! Fixed-interval retry of fleet API calls.
//!
//! A [`RetryPolicy`] allows `max_attempts` calls in total and sleeps
//! `interval_ms` between them. Only transient failures (see
//! [`classify`](crate::classify::classify)) are retried. The cancel signal
//! is checked before every attempt and raced against the sleep; a call that
//! has started always runs to completion, so anything it created is known.

use std::future::Future;
use std::time::Duration;

use fleet_api::FleetError;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::classify::{classify, ErrorClass};
use crate::error::{BuilderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls allowed, the first one included.
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Budget for listing volumes and machines: 3 attempts, 1s apart.
    pub fn reads() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Budget for volume creation: 5 attempts, 1s apart.
    pub fn volume_create() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    /// Same budget, no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Run `call` until it succeeds, fails permanently, exhausts the budget,
    /// or `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        cancel: &CancelSignal,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = fleet_api::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(BuilderError::Cancelled { op });
            }
            attempt += 1;
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match classify(&err) {
                ErrorClass::Permanent => {
                    tracing::debug!(op, attempt, error = %err, "permanent fleet API error");
                    return Err(BuilderError::Remote { op, source: err });
                }
                ErrorClass::Transient if attempt >= max_attempts => {
                    tracing::warn!(op, attempts = attempt, error = %err, "retry budget exhausted");
                    return Err(BuilderError::RetriesExhausted {
                        op,
                        attempts: attempt,
                        source: err,
                    });
                }
                ErrorClass::Transient => {
                    tracing::warn!(op, attempt, status = ?err.status(), "server error, retrying");
                    race(op, cancel, tokio::time::sleep(self.interval())).await?;
                }
            }
        }
    }
}

/// Run a single, non-retried call that still honours cancellation.
pub async fn once<T, Fut>(op: &'static str, cancel: &CancelSignal, call: Fut) -> Result<T>
where
    Fut: Future<Output = fleet_api::Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(BuilderError::Cancelled { op });
    }
    race(op, cancel, call)
        .await?
        .map_err(|source: FleetError| BuilderError::Remote { op, source })
}

/// Run a single call that creates remote state. Cancellation is checked
/// before it starts; once started it is awaited to the end.
pub async fn commit<T, Fut>(op: &'static str, cancel: &CancelSignal, call: Fut) -> Result<T>
where
    Fut: Future<Output = fleet_api::Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(BuilderError::Cancelled { op });
    }
    call.await.map_err(|source| BuilderError::Remote { op, source })
}

async fn race<Fut: Future>(
    op: &'static str,
    cancel: &CancelSignal,
    fut: Fut,
) -> Result<Fut::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BuilderError::Cancelled { op }),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `status` for the first `failures` calls, then returns the call number.
    async fn flaky(calls: &AtomicU32, failures: u32, status: u16) -> fleet_api::Result<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(FleetError::api(status, "flaky"))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn succeeds_on_last_allowed_attempt() {
        let calls = AtomicU32::new(0);
        let got = RetryPolicy::immediate(3)
            .run("list volumes", &CancelSignal::never(), || flaky(&calls, 2, 503))
            .await
            .unwrap();
        assert_eq!(got, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_at_budget_with_last_error() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run("list volumes", &CancelSignal::never(), || flaky(&calls, 3, 502))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, BuilderError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.remote_status(), Some(502));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(5)
            .run("create volume", &CancelSignal::never(), || flaky(&calls, 1, 404))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BuilderError::Remote { .. }));
        assert_eq!(err.remote_status(), Some(404));
    }

    #[tokio::test]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let got = RetryPolicy::immediate(0)
            .run("list machines", &CancelSignal::never(), || flaky(&calls, 0, 500))
            .await
            .unwrap();
        assert_eq!(got, 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff_sleep() {
        let (handle, signal) = CancelSignal::new();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(30));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            policy.run("create volume", &signal, || flaky(&calls, 10, 503)),
        )
        .await
        .expect("cancellation should end the retry loop")
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_cancelled_makes_no_call() {
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run("list volumes", &signal, || flaky(&calls, 0, 500))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = once("delete app", &signal, async { Ok::<_, FleetError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn started_attempt_finishes_despite_cancel() {
        let (handle, signal) = CancelSignal::new();
        let calls = AtomicU32::new(0);
        let (handle, calls) = (&handle, &calls);

        let err = RetryPolicy::immediate(3)
            .run("create volume", &signal, || async move {
                handle.cancel();
                tokio::time::sleep(Duration::from_millis(20)).await;
                flaky(calls, 1, 503).await
            })
            .await
            .unwrap_err();

        // The first attempt completed; the second was never started.
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn commit_runs_to_completion_once_started() {
        let (handle, signal) = CancelSignal::new();
        let got = commit("create app", &signal, async {
            handle.cancel();
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, FleetError>(7)
        })
        .await
        .unwrap();
        assert_eq!(got, 7);

        let err = commit("create app", &signal, async { Ok::<_, FleetError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn huge_interval_saturates() {
        assert_eq!(RetryPolicy::new(1, Duration::MAX).interval_ms, u64::MAX);
    }

    #[tokio::test]
    async fn once_never_retries_server_errors() {
        let calls = AtomicU32::new(0);
        let err = once("launch machine", &CancelSignal::never(), flaky(&calls, 1, 503))
            .await
            .unwrap_err();
        assert!(matches!(err, BuilderError::Remote { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_budgets() {
        assert_eq!(RetryPolicy::reads().max_attempts, 3);
        assert_eq!(RetryPolicy::volume_create().max_attempts, 5);
        assert_eq!(RetryPolicy::reads().interval(), Duration::from_secs(1));
    }
}
