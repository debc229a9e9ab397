//! The long-lived instance a host process constructs once and calls into.
//!
//! Wires the sequencer, executor, reconciler and group-switch coordinator
//! around one store and one backend, and turns transition outcomes into the
//! user-visible notices hosts expect.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::backend::{ProxyBackend, SelectionMirror};
use crate::config::Config;
use crate::error::{Result, SwitchError};
use crate::notify::Notifier;
use crate::proxy_switch::ProxySwitchCoordinator;
use crate::reconcile::{ReconcileReport, ReconciliationScheduler};
use crate::sequencer::{ActivationOutcome, ActivationSequencer, SequencerSnapshot};
use crate::steps::StepRunner;
use crate::store::SelectionStore;
use crate::transition::{TransitionError, TransitionExecutor};
use crate::types::{ResourceId, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivateOptions {
    /// Re-run the transition even if the target is already committed.
    pub force: bool,
    /// Emit a success notice once the transition commits.
    pub notify_success: bool,
}

#[derive(Debug)]
pub enum ActivationReport {
    /// An activation for this target (or, for `reactivate`, any target) is
    /// already in flight.
    Duplicate,
    NoOp,
    /// A newer request took over before this one committed.
    Superseded,
    Committed {
        generation: u64,
        partial: bool,
        reconciliation: Option<JoinHandle<ReconcileReport>>,
    },
}

pub struct Orchestrator {
    store: Arc<dyn SelectionStore>,
    backend: Arc<dyn ProxyBackend>,
    notifier: Arc<dyn Notifier>,
    sequencer: Arc<ActivationSequencer>,
    coordinator: Arc<ProxySwitchCoordinator>,
    reconciler: ReconciliationScheduler,
    executor: TransitionExecutor,
}

impl Orchestrator {
    /// Build the orchestrator, seeding the committed profile from the store.
    pub fn new(
        config: &Config,
        store: Arc<dyn SelectionStore>,
        backend: Arc<dyn ProxyBackend>,
        mirror: Arc<dyn SelectionMirror>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let committed = store.current_profile()?;
        let sequencer = Arc::new(
            ActivationSequencer::new("profile", Arc::clone(&notifier)).with_committed(committed),
        );
        let coordinator = Arc::new(ProxySwitchCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            Arc::clone(&mirror),
            config.selection.clone(),
        ));
        let reconciler = ReconciliationScheduler::new(
            Arc::clone(&sequencer),
            Arc::clone(&coordinator),
            Arc::clone(&store),
            Arc::clone(&backend),
        )
        .with_delay(config.activation.reconcile_delay())
        .with_seeding(config.activation.seed_empty_selections);
        let executor = TransitionExecutor::new(
            Arc::clone(&sequencer),
            Arc::clone(&store),
            Arc::clone(&backend),
            mirror,
            reconciler.clone(),
            StepRunner::new(Arc::clone(&notifier)),
        )
        .with_connection_drain(config.activation.close_connections_on_switch);

        Ok(Self {
            store,
            backend,
            notifier,
            sequencer,
            coordinator,
            reconciler,
            executor,
        })
    }

    pub fn sequencer(&self) -> &ActivationSequencer {
        &self.sequencer
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        self.sequencer.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn SelectionStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn ProxyBackend> {
        &self.backend
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Make `target` the active profile.
    pub async fn activate(&self, target: &str, opts: ActivateOptions) -> Result<ActivationReport> {
        let target = ResourceId::new(target)?;
        let req = match self.sequencer.request(target, opts.force) {
            ActivationOutcome::Duplicate => return Ok(ActivationReport::Duplicate),
            ActivationOutcome::NoOp => return Ok(ActivationReport::NoOp),
            ActivationOutcome::Proceed(req) => req,
        };

        match self.executor.run(&req).await {
            Ok(report) => {
                if opts.notify_success {
                    self.notifier.emit(Severity::Success, "Profile Switched");
                }
                Ok(ActivationReport::Committed {
                    generation: report.generation,
                    partial: report.is_partial(),
                    reconciliation: report.reconciliation,
                })
            }
            Err(TransitionError::Superseded) => Ok(ActivationReport::Superseded),
            Err(e) => {
                self.sequencer.abandon(req.generation);
                self.notifier.emit(Severity::Error, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Re-apply the persisted current profile without notices.
    pub async fn reactivate(&self) -> Result<ActivationReport> {
        if let Some(in_flight) = self.sequencer.in_flight() {
            tracing::debug!(%in_flight, "reactivation skipped, switch in progress");
            return Ok(ActivationReport::Duplicate);
        }
        let current = self
            .store
            .current_profile()?
            .ok_or(SwitchError::NoCurrentProfile)?;
        self.activate(
            current.as_str(),
            ActivateOptions {
                force: true,
                notify_success: false,
            },
        )
        .await
    }

    /// Switch the member of one group in the active profile.
    ///
    /// Without an explicit `previous`, the group's current member is looked up
    /// from the backend so connection cleanup knows what is being replaced.
    pub async fn select(
        &self,
        group: &str,
        member: &str,
        previous: Option<&str>,
        save: bool,
    ) -> Result<()> {
        let looked_up;
        let previous = match previous {
            Some(p) => Some(p),
            None => {
                looked_up = self.current_member(group).await;
                looked_up.as_deref()
            }
        };

        let result = self
            .coordinator
            .switch_member(group, member, previous, !save)
            .await;
        if let Err(e) = &result {
            self.notifier.emit(Severity::Error, &e.to_string());
        }
        result
    }

    async fn current_member(&self, group: &str) -> Option<String> {
        match self.backend.groups().await {
            Ok(groups) => groups
                .into_iter()
                .find(|g| g.name == group)
                .and_then(|g| g.now),
            Err(e) => {
                tracing::debug!(group, "could not look up current member: {e}");
                None
            }
        }
    }

    /// Run a reconciliation pass for the current profile right now.
    ///
    /// Returns an aborted report while an activation is in flight; that
    /// activation schedules its own pass.
    pub async fn reconcile_now(&self) -> Result<ReconcileReport> {
        if self.sequencer.in_flight().is_some() {
            return Ok(ReconcileReport {
                aborted: true,
                ..ReconcileReport::default()
            });
        }
        let current = self
            .store
            .current_profile()?
            .ok_or(SwitchError::NoCurrentProfile)?;
        Ok(self
            .reconciler
            .run_pass(self.sequencer.current_generation(), &current)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopMirror;
    use crate::fakes::{selector, FakeBackend, MemoryStore, RecordingNotifier};
    use crate::types::SelectionRecord;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn build(
        store: Arc<MemoryStore>,
    ) -> (Orchestrator, Arc<FakeBackend>, Arc<RecordingNotifier>) {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = Orchestrator::new(
            &Config::default(),
            store,
            backend.clone(),
            Arc::new(NoopMirror),
            notifier.clone(),
        )
        .unwrap();
        (orch, backend, notifier)
    }

    #[tokio::test]
    async fn committed_profile_is_seeded_from_store() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        store.set_current_profile(&id("a")).unwrap();
        let (orch, backend, _) = build(store);

        let report = orch.activate("a", ActivateOptions::default()).await.unwrap();

        assert!(matches!(report, ActivationReport::NoOp));
        assert!(backend.dispatched().is_empty());
    }

    #[tokio::test]
    async fn success_notice_only_when_requested() {
        let store = Arc::new(MemoryStore::with_profiles(&["a", "b"]));
        let (orch, _, notifier) = build(store);

        orch.activate("a", ActivateOptions::default()).await.unwrap();
        assert_eq!(notifier.count(Severity::Success), 0);

        orch.activate(
            "b",
            ActivateOptions {
                force: false,
                notify_success: true,
            },
        )
        .await
        .unwrap();
        assert!(notifier
            .messages()
            .contains(&(Severity::Success, "Profile Switched".to_string())));
    }

    #[tokio::test]
    async fn failure_emits_error_and_releases_slot() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        let (orch, backend, notifier) = build(store);
        backend.reject_profile("a", "core refused");

        let err = orch
            .activate("a", ActivateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SwitchError::Transition(TransitionError::BackendRejected(_))
        ));
        assert_eq!(notifier.count(Severity::Error), 1);
        assert_eq!(orch.sequencer().in_flight(), None);

        // Retrying the same target is a fresh attempt, not a duplicate.
        let err = orch.activate("a", ActivateOptions::default()).await;
        assert!(err.is_err());
        assert_eq!(backend.dispatched().len(), 2);
    }

    #[tokio::test]
    async fn blank_target_is_rejected_up_front() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        let (orch, backend, _) = build(store);
        assert!(matches!(
            orch.activate("  ", ActivateOptions::default()).await,
            Err(SwitchError::Validation(_))
        ));
        assert_eq!(orch.snapshot().current_generation, 0);
        assert!(backend.dispatched().is_empty());
    }

    #[tokio::test]
    async fn reactivate_forces_current_profile_silently() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        store.set_current_profile(&id("a")).unwrap();
        let (orch, backend, notifier) = build(store);

        let report = orch.reactivate().await.unwrap();

        assert!(matches!(report, ActivationReport::Committed { .. }));
        assert_eq!(backend.active_profile(), Some(id("a")));
        assert_eq!(notifier.count(Severity::Success), 0);
    }

    #[tokio::test]
    async fn reactivate_without_current_profile_fails() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        let (orch, _, _) = build(store);
        assert!(matches!(
            orch.reactivate().await,
            Err(SwitchError::NoCurrentProfile)
        ));
    }

    #[tokio::test]
    async fn select_persists_into_current_profile() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        store.set_current_profile(&id("a")).unwrap();
        let (orch, backend, _) = build(store.clone());
        backend.set_groups(vec![selector("Proxy", "HK", &["HK", "JP"])]);

        orch.select("Proxy", "JP", None, true).await.unwrap();

        let saved = store.read_selections(&id("a")).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].member, "JP");
        assert_eq!(backend.group_now("Proxy").as_deref(), Some("JP"));
    }

    #[tokio::test]
    async fn select_failure_emits_error_notice() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        let (orch, backend, notifier) = build(store);
        backend.reject_member("JP", "unknown proxy");

        assert!(orch.select("Proxy", "JP", Some("HK"), false).await.is_err());
        assert_eq!(notifier.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn reconcile_now_reapplies_saved_selection() {
        let store = Arc::new(MemoryStore::with_profiles(&["a"]));
        store.set_current_profile(&id("a")).unwrap();
        store
            .write_selection(&id("a"), SelectionRecord::new("Proxy", "JP"))
            .unwrap();
        let (orch, backend, _) = build(store);
        backend.set_groups(vec![selector("Proxy", "HK", &["HK", "JP"])]);

        let report = orch.reconcile_now().await.unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(backend.group_now("Proxy").as_deref(), Some("JP"));
    }
}
