//! Ordered compensation for multi-step creation.
//!
//! Each step that creates a remote resource pushes one compensating action.
//! [`Rollback::finish`] runs them newest-first when the operation failed and
//! drops them unrun when it succeeded. Compensations are best-effort: a
//! failing one is logged and the rest still run.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

struct Compensation<'a> {
    label: String,
    action: BoxFuture<'a, fleet_api::Result<()>>,
}

#[derive(Default)]
pub struct Rollback<'a> {
    steps: Vec<Compensation<'a>>,
}

impl<'a> Rollback<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Register `action`. It does not start until the rollback unwinds.
    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: Future<Output = fleet_api::Result<()>> + Send + 'a,
    {
        self.steps.push(Compensation {
            label: label.into(),
            action: action.boxed(),
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Labels in registration order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }

    /// Run every compensation, newest first. Returns the labels that failed.
    pub async fn unwind(self) -> Vec<String> {
        let mut failed = Vec::new();
        for step in self.steps.into_iter().rev() {
            tracing::warn!(step = %step.label, "rolling back");
            if let Err(e) = step.action.await {
                tracing::error!(step = %step.label, error = %e, "rollback step failed");
                failed.push(step.label);
            }
        }
        failed
    }

    /// Unwind if `result` is an error, then hand `result` back untouched.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        if result.is_err() && !self.is_empty() {
            self.unwind().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_api::FleetError;
    use std::sync::Mutex;

    #[tokio::test]
    async fn unwinds_in_reverse_and_continues_past_failures() {
        let log = Mutex::new(Vec::new());
        let mut rollback = Rollback::new();
        rollback.push("delete app", async {
            log.lock().unwrap().push("app");
            Ok(())
        });
        rollback.push("delete volume", async {
            log.lock().unwrap().push("volume");
            Err(FleetError::api(500, "nope"))
        });
        assert_eq!(rollback.labels(), vec!["delete app", "delete volume"]);

        let failed = rollback.unwind().await;
        assert_eq!(failed, vec!["delete volume".to_string()]);
        assert_eq!(*log.lock().unwrap(), vec!["volume", "app"]);
    }

    #[tokio::test]
    async fn success_runs_nothing() {
        let log = Mutex::new(Vec::<&str>::new());
        let mut rollback = Rollback::new();
        rollback.push("delete app", async {
            log.lock().unwrap().push("app");
            Ok(())
        });

        let out = rollback.finish(Ok::<_, String>(7)).await;
        assert_eq!(out, Ok(7));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_primary_error() {
        let mut rollback = Rollback::new();
        rollback.push("delete app", async { Err(FleetError::api(503, "cleanup broke")) });

        let out: Result<(), String> = rollback.finish(Err("launch failed".to_string())).await;
        assert_eq!(out, Err("launch failed".to_string()));
    }
}
