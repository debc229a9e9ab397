//! Multi-step maintenance of the background service that runs the core.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{Result, SwitchError};
use crate::notify::Notifier;
use crate::steps::{with_retry, OperationStep, SequenceReport, StepRunner};
use crate::types::Severity;

/// Host-side service and core process control.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn install(&self) -> std::result::Result<(), String>;
    async fn reinstall(&self) -> std::result::Result<(), String>;
    async fn uninstall(&self) -> std::result::Result<(), String>;
    async fn stop_core(&self) -> std::result::Result<(), String>;
    async fn restart_core(&self) -> std::result::Result<(), String>;
    async fn is_installed(&self) -> std::result::Result<bool, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOperation {
    Install,
    Reinstall,
    Uninstall,
}

impl ServiceOperation {
    fn expects_installed(self) -> bool {
        !matches!(self, ServiceOperation::Uninstall)
    }

    fn completion_message(self) -> &'static str {
        match self {
            ServiceOperation::Install => "Service Installed Successfully",
            ServiceOperation::Reinstall => "Service Reinstalled Successfully",
            ServiceOperation::Uninstall => "Service Uninstalled Successfully",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub operation: ServiceOperation,
    /// Last observed installation state.
    pub installed: bool,
    /// Whether `installed` matched the expected state within the retry budget.
    pub verified: bool,
    pub completed_steps: Vec<String>,
    pub skipped_steps: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    /// Another operation is running; nothing was done.
    Busy,
    Completed(ServiceReport),
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn pause(d: Duration) -> std::result::Result<(), String> {
    tokio::time::sleep(d).await;
    Ok(())
}

pub struct ServiceManager {
    control: Arc<dyn ServiceControl>,
    runner: StepRunner,
    notifier: Arc<dyn Notifier>,
    config: ServiceConfig,
    busy: AtomicBool,
}

impl ServiceManager {
    pub fn new(
        control: Arc<dyn ServiceControl>,
        notifier: Arc<dyn Notifier>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            control,
            runner: StepRunner::new(Arc::clone(&notifier)),
            notifier,
            config,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn steps(&self, op: ServiceOperation) -> Vec<OperationStep<'_, String>> {
        let control = self.control.as_ref();
        let stabilization = Duration::from_millis(self.config.stabilization_ms);
        let core_stop = Duration::from_millis(self.config.core_stop_ms);

        let restart = || {
            OperationStep::optional("restart_core", move || control.restart_core())
                .start_message("Restarting Core...")
        };

        match op {
            ServiceOperation::Install => vec![
                OperationStep::required("install_service", move || control.install())
                    .start_message("Installing Service...")
                    .success_message("Service Installed Successfully"),
                OperationStep::required("wait_for_stabilization", move || pause(stabilization)),
                restart(),
            ],
            ServiceOperation::Reinstall => vec![
                OperationStep::required("reinstall_service", move || control.reinstall())
                    .start_message("Reinstalling Service...")
                    .success_message("Service Reinstalled Successfully"),
                OperationStep::required("wait_for_stabilization", move || pause(stabilization)),
                restart(),
            ],
            ServiceOperation::Uninstall => vec![
                OperationStep::optional("stop_core", move || control.stop_core())
                    .start_message("Stopping Core..."),
                OperationStep::required("wait_for_core_stop", move || pause(core_stop)),
                OperationStep::required("uninstall_service", move || control.uninstall())
                    .start_message("Uninstalling Service...")
                    .success_message("Service Uninstalled Successfully"),
                OperationStep::required("wait_for_removal", move || pause(stabilization)),
                restart(),
            ],
        }
    }

    /// Run `op` unless another operation is already running.
    pub async fn run(&self, op: ServiceOperation) -> Result<ServiceOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::warn!(?op, "service operation already running, ignoring request");
            return Ok(ServiceOutcome::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        match self.execute(op).await {
            Ok(report) => {
                self.notifier.emit(Severity::Success, op.completion_message());
                Ok(ServiceOutcome::Completed(report))
            }
            Err(e) => {
                self.notifier.emit(Severity::Error, &e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(&self, op: ServiceOperation) -> Result<ServiceReport> {
        tracing::info!(?op, "service operation started");
        let sequence: SequenceReport = self
            .runner
            .run_sequence(self.steps(op))
            .await
            .map_err(|e| SwitchError::Service(e.to_string()))?;

        tokio::time::sleep(Duration::from_millis(self.config.stabilization_ms)).await;

        let expected = op.expects_installed();
        let verify_delay = Duration::from_millis(self.config.verify_delay_ms);
        let verified = with_retry(self.config.verify_attempts, verify_delay, || async {
            let installed = self.control.is_installed().await?;
            if installed != expected {
                return Err(format!(
                    "service state not updated: expected {expected}, found {installed}"
                ));
            }
            Ok(installed)
        })
        .await;

        let (installed, verified) = match verified {
            Ok(installed) => (installed, true),
            Err(e) => {
                tracing::error!(?op, "service state verification failed: {e}");
                let observed = match self.control.is_installed().await {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::error!("could not read service state: {e}");
                        false
                    }
                };
                tracing::warn!(?op, observed, "using last observed service state");
                (observed, false)
            }
        };

        tokio::time::sleep(Duration::from_millis(self.config.state_update_ms)).await;
        tracing::info!(?op, installed, verified, "service operation finished");

        Ok(ServiceReport {
            operation: op,
            installed,
            verified,
            completed_steps: sequence.completed,
            skipped_steps: sequence.skipped.into_iter().map(|s| s.step).collect(),
        })
    }
}
