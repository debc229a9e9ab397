//! Carrying one admitted activation through to the backend.
//!
//! The transition is a `StepRunner` sequence. Every step that mutates
//! persisted or backend state re-checks the request's token right before the
//! mutation. The backend apply cannot be aborted once dispatched; instead its
//! result is dropped if the token was cancelled while it was in flight.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::backend::{
    drain_connections, ApplyTarget, DrainFilter, ProxyBackend, SelectionMirror,
};
use crate::reconcile::{ReconcileReport, ReconciliationScheduler};
use crate::sequencer::{ActivationRequest, ActivationSequencer};
use crate::steps::{OperationStep, SkippedStep, StepRunner};
use crate::store::SelectionStore;
use crate::types::ResourceId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransitionError {
    /// A newer activation took over. Not a user-visible failure.
    #[error("superseded by a newer activation")]
    Superseded,

    #[error("invalid target: {0}")]
    Validation(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("backend rejected the switch: {0}")]
    BackendRejected(String),

    /// A secondary sync failed after the backend switched. Only ever recorded
    /// as a skipped optional step, never returned from `run`.
    #[error("secondary sync failed: {0}")]
    PartialFailure(String),
}

/// A committed transition.
#[derive(Debug)]
pub struct TransitionReport {
    pub generation: u64,
    pub target: ResourceId,
    pub previous: Option<ResourceId>,
    /// Optional steps that failed.
    pub warnings: Vec<SkippedStep>,
    pub reconciliation: Option<JoinHandle<ReconcileReport>>,
}

impl TransitionReport {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

pub struct TransitionExecutor {
    sequencer: Arc<ActivationSequencer>,
    store: Arc<dyn SelectionStore>,
    backend: Arc<dyn ProxyBackend>,
    mirror: Arc<dyn SelectionMirror>,
    reconciler: ReconciliationScheduler,
    runner: StepRunner,
    drain_on_switch: bool,
    /// Held across the token check and the persisted write it guards.
    write_gate: Mutex<()>,
    /// Serializes profile applies so a superseded reload cannot land after
    /// the one that replaced it.
    apply_gate: tokio::sync::Mutex<()>,
}

impl TransitionExecutor {
    pub fn new(
        sequencer: Arc<ActivationSequencer>,
        store: Arc<dyn SelectionStore>,
        backend: Arc<dyn ProxyBackend>,
        mirror: Arc<dyn SelectionMirror>,
        reconciler: ReconciliationScheduler,
        runner: StepRunner,
    ) -> Self {
        Self {
            sequencer,
            store,
            backend,
            mirror,
            reconciler,
            runner,
            drain_on_switch: true,
            write_gate: Mutex::new(()),
            apply_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_connection_drain(mut self, enabled: bool) -> Self {
        self.drain_on_switch = enabled;
        self
    }

    fn ensure_live(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        if req.token.is_cancelled() || !self.sequencer.is_current(req.generation) {
            return Err(TransitionError::Superseded);
        }
        Ok(())
    }

    fn validate(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        self.ensure_live(req)?;
        match self.store.profile(&req.target) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(TransitionError::Validation(format!(
                "profile not found: {}",
                req.target
            ))),
            Err(e) => Err(TransitionError::PersistenceFailed(e.to_string())),
        }
    }

    fn persist(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        let _gate = self
            .write_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.ensure_live(req)?;
        self.store
            .set_current_profile(&req.target)
            .map_err(|e| TransitionError::PersistenceFailed(e.to_string()))
    }

    async fn apply(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        let _gate = self.apply_gate.lock().await;
        self.ensure_live(req)?;

        let result = self
            .backend
            .apply_selection(&ApplyTarget::Profile(req.target.clone()))
            .await;

        if req.token.is_cancelled() {
            tracing::debug!(
                generation = req.generation,
                target = %req.target,
                "discarding backend result of superseded activation"
            );
            return Err(TransitionError::Superseded);
        }
        result.map_err(|e| TransitionError::BackendRejected(e.to_string()))
    }

    async fn sync_mirror(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        self.ensure_live(req)?;
        self.mirror
            .sync_selection()
            .await
            .map_err(TransitionError::PartialFailure)
    }

    async fn drain(&self, req: &ActivationRequest) -> Result<(), TransitionError> {
        self.ensure_live(req)?;
        drain_connections(self.backend.as_ref(), &DrainFilter::All)
            .await
            .map(|_| ())
            .map_err(|e| TransitionError::PartialFailure(e.to_string()))
    }

    /// Run the transition for `req`.
    ///
    /// On success the sequencer is completed and a reconciliation pass is
    /// scheduled. On any error the caller decides whether to abandon the
    /// in-flight slot; `Superseded` needs no cleanup.
    pub async fn run(&self, req: &ActivationRequest) -> Result<TransitionReport, TransitionError> {
        let previous = self.sequencer.committed();
        let switching_profiles = previous.as_ref() != Some(&req.target);
        tracing::info!(
            generation = req.generation,
            target = %req.target,
            previous = ?previous,
            "activation started"
        );

        let mut steps = vec![
            OperationStep::required("validate", || async { self.validate(req) }),
            OperationStep::required("persist", || async { self.persist(req) }),
            OperationStep::required("apply", || self.apply(req)),
            OperationStep::required("recheck", || async { self.ensure_live(req) }),
            OperationStep::optional("mirror", || self.sync_mirror(req)),
        ];
        if self.drain_on_switch && switching_profiles {
            steps.push(OperationStep::optional("drain", || self.drain(req)));
        }

        let report = match self.runner.run_sequence(steps).await {
            Ok(report) => report,
            Err(e) if e.cause == TransitionError::Superseded => {
                tracing::info!(
                    generation = req.generation,
                    target = %req.target,
                    step = %e.failed_step,
                    "activation superseded"
                );
                return Err(TransitionError::Superseded);
            }
            Err(e) => {
                tracing::warn!(
                    generation = req.generation,
                    target = %req.target,
                    step = %e.failed_step,
                    "activation failed: {}",
                    e.cause
                );
                return Err(e.cause);
            }
        };

        if !self.sequencer.complete(req.generation) {
            return Err(TransitionError::Superseded);
        }

        let reconciliation = self
            .reconciler
            .schedule(req.generation, req.target.clone());

        tracing::info!(
            generation = req.generation,
            target = %req.target,
            warnings = report.skipped.len(),
            "activation committed"
        );
        Ok(TransitionReport {
            generation: req.generation,
            target: req.target.clone(),
            previous,
            warnings: report.skipped,
            reconciliation: Some(reconciliation),
        })
    }
}
