//! Ordered execution of named steps.
//!
//! A sequence is a `Vec<OperationStep>`; each step is either required (its
//! failure aborts the sequence) or optional (its failure is recorded and the
//! sequence continues). The runner knows nothing about cancellation: callers
//! that need it check their token inside the step action.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::notify::Notifier;
use crate::types::Severity;

type StepAction<'a, E> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), E>> + Send + 'a>;

// ---------------------------------------------------------------------------
// OperationStep
// ---------------------------------------------------------------------------

/// One unit of work in a sequence.
pub struct OperationStep<'a, E> {
    pub name: String,
    pub optional: bool,
    pub start_message: Option<String>,
    pub success_message: Option<String>,
    action: StepAction<'a, E>,
}

impl<'a, E: 'a> OperationStep<'a, E> {
    pub fn required<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
    {
        Self {
            name: name.into(),
            optional: false,
            start_message: None,
            success_message: None,
            action: Box::new(move || Box::pin(f())),
        }
    }

    pub fn optional<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
    {
        Self {
            optional: true,
            ..Self::required(name, f)
        }
    }

    /// A step that runs `f(primary)` and, if that fails, runs `f(alternate)`
    /// exactly once. `on_fallback` observes the first failure before the retry.
    pub fn with_fallback<P, F, Fut, H>(
        name: impl Into<String>,
        primary: P,
        alternate: P,
        f: F,
        on_fallback: H,
    ) -> Self
    where
        P: Send + 'a,
        F: Fn(P) -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
        H: FnOnce(&E) + Send + 'a,
        E: Send,
    {
        Self::required(name, move || async move {
            match f(primary).await {
                Ok(()) => Ok(()),
                Err(first) => {
                    on_fallback(&first);
                    f(alternate).await
                }
            }
        })
    }

    pub fn start_message(mut self, msg: impl Into<String>) -> Self {
        self.start_message = Some(msg.into());
        self
    }

    pub fn success_message(mut self, msg: impl Into<String>) -> Self {
        self.success_message = Some(msg.into());
        self
    }
}

impl<E> fmt::Debug for OperationStep<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationStep")
            .field("name", &self.name)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A required step failed; no later step ran.
#[derive(Debug, Error)]
#[error("step '{failed_step}' failed: {cause}")]
pub struct StepError<E> {
    pub failed_step: String,
    pub cause: E,
}

/// An optional step that failed and was skipped over.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStep {
    pub step: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub completed: Vec<String>,
    pub skipped: Vec<SkippedStep>,
}

impl SequenceReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StepRunner {
    notifier: Arc<dyn Notifier>,
}

impl StepRunner {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Run `steps` strictly in order, one at a time.
    pub async fn run_sequence<E: fmt::Display>(
        &self,
        steps: Vec<OperationStep<'_, E>>,
    ) -> Result<SequenceReport, StepError<E>> {
        let mut report = SequenceReport::default();

        for step in steps {
            let OperationStep {
                name,
                optional,
                start_message,
                success_message,
                action,
            } = step;

            if let Some(msg) = &start_message {
                self.notifier.emit(Severity::Info, msg);
            }
            tracing::debug!(step = %name, "running step");

            match action().await {
                Ok(()) => {
                    if let Some(msg) = &success_message {
                        self.notifier.emit(Severity::Success, msg);
                    }
                    tracing::debug!(step = %name, "step succeeded");
                    report.completed.push(name);
                }
                Err(cause) if optional => {
                    tracing::warn!(step = %name, "optional step failed, continuing: {cause}");
                    report.skipped.push(SkippedStep {
                        step: name,
                        message: cause.to_string(),
                    });
                }
                Err(cause) => {
                    tracing::debug!(step = %name, "required step failed, aborting sequence: {cause}");
                    return Err(StepError {
                        failed_step: name,
                        cause,
                    });
                }
            }
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Bounded retry
// ---------------------------------------------------------------------------

/// Call `f` up to `attempts` times, sleeping `delay` between failures.
/// Returns the last error once attempts are exhausted. `attempts == 0` is
/// treated as 1.
pub async fn with_retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut f: F) -> Result<T, E>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, attempts, "operation failed, retrying: {e}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingNotifier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn runner() -> (StepRunner, Arc<RecordingNotifier>) {
        let rec = Arc::new(RecordingNotifier::default());
        (StepRunner::new(rec.clone()), rec)
    }

    fn trace_step<'a>(
        log: &'a Mutex<Vec<&'static str>>,
        name: &'static str,
        ok: bool,
        optional: bool,
    ) -> OperationStep<'a, String> {
        let f = move || async move {
            log.lock().unwrap().push(name);
            if ok {
                Ok(())
            } else {
                Err(format!("{name} broke"))
            }
        };
        if optional {
            OperationStep::optional(name, f)
        } else {
            OperationStep::required(name, f)
        }
    }

    #[tokio::test]
    async fn required_failure_short_circuits() {
        let (runner, _) = runner();
        let log = Mutex::new(Vec::new());
        let err = runner
            .run_sequence(vec![
                trace_step(&log, "A", true, false),
                trace_step(&log, "B", false, false),
                trace_step(&log, "C", true, true),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.failed_step, "B");
        assert_eq!(err.cause, "B broke");
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn optional_failure_continues() {
        let (runner, _) = runner();
        let log = Mutex::new(Vec::new());
        let report = runner
            .run_sequence(vec![
                trace_step(&log, "A", true, false),
                trace_step(&log, "B", false, true),
                trace_step(&log, "C", true, false),
            ])
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(report.completed, vec!["A", "C"]);
        assert_eq!(
            report.skipped,
            vec![SkippedStep {
                step: "B".into(),
                message: "B broke".into()
            }]
        );
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn messages_are_emitted_around_steps() {
        let (runner, rec) = runner();
        let steps = vec![
            OperationStep::<String>::required("install", || async { Ok(()) })
                .start_message("Installing Service...")
                .success_message("Service Installed Successfully"),
            OperationStep::required("restart", || async { Err("boom".to_string()) })
                .start_message("Restarting Core...")
                .success_message("never"),
        ];
        assert!(runner.run_sequence(steps).await.is_err());
        assert_eq!(
            rec.messages(),
            vec![
                (Severity::Info, "Installing Service...".to_string()),
                (Severity::Success, "Service Installed Successfully".to_string()),
                (Severity::Info, "Restarting Core...".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_sequence_succeeds() {
        let (runner, _) = runner();
        let report = runner
            .run_sequence(Vec::<OperationStep<String>>::new())
            .await
            .unwrap();
        assert!(report.completed.is_empty());
    }

    #[tokio::test]
    async fn fallback_retries_once_with_alternate() {
        let (runner, _) = runner();
        let seen = Mutex::new(Vec::new());
        let fallbacks = AtomicU32::new(0);
        let step = OperationStep::with_fallback(
            "import",
            false,
            true,
            |self_proxy: bool| {
                seen.lock().unwrap().push(self_proxy);
                async move {
                    if self_proxy {
                        Ok(())
                    } else {
                        Err("direct fetch failed".to_string())
                    }
                }
            },
            |_e: &String| {
                fallbacks.fetch_add(1, Ordering::SeqCst);
            },
        );
        runner.run_sequence(vec![step]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_surfaces_second_error() {
        let (runner, _) = runner();
        let calls = AtomicU32::new(0);
        let step = OperationStep::with_fallback(
            "import",
            1u8,
            2u8,
            |n: u8| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {n} failed")) }
            },
            |_e: &String| {},
        );
        let err = runner.run_sequence(vec![step]).await.unwrap_err();
        assert_eq!(err.cause, "attempt 2 failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(3, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry(5, Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err("not yet".into())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
