//! Deferred re-application of remembered group selections.
//!
//! A profile reload resets every group to the core's defaults. Once a
//! transition commits, a pass is scheduled that compares the core's reported
//! `now` for each selector group against the profile's saved records and
//! switches the drifted ones back. Every write is preceded by a generation
//! check, so a pass scheduled for an activation that has since been superseded
//! does nothing.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::{GroupKind, ProxyBackend, ProxyGroup};
use crate::proxy_switch::ProxySwitchCoordinator;
use crate::sequencer::ActivationSequencer;
use crate::store::SelectionStore;
use crate::types::{ResourceId, SelectionRecord};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Records re-applied to the backend.
    pub applied: Vec<SelectionRecord>,
    /// Records written from the core's state because none were saved.
    pub seeded: usize,
    /// Groups added to the saved list by the write-back after a switch.
    pub recorded: usize,
    /// Groups whose saved member no longer exists in the group.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// The pass stopped because a newer activation took over.
    pub aborted: bool,
}

impl ReconcileReport {
    pub fn wrote_anything(&self) -> bool {
        !self.applied.is_empty() || self.seeded > 0 || self.recorded > 0
    }
}

#[derive(Clone)]
pub struct ReconciliationScheduler {
    sequencer: Arc<ActivationSequencer>,
    coordinator: Arc<ProxySwitchCoordinator>,
    store: Arc<dyn SelectionStore>,
    backend: Arc<dyn ProxyBackend>,
    delay: Duration,
    seed_empty: bool,
}

impl ReconciliationScheduler {
    pub fn new(
        sequencer: Arc<ActivationSequencer>,
        coordinator: Arc<ProxySwitchCoordinator>,
        store: Arc<dyn SelectionStore>,
        backend: Arc<dyn ProxyBackend>,
    ) -> Self {
        Self {
            sequencer,
            coordinator,
            store,
            backend,
            delay: Duration::from_millis(50),
            seed_empty: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_seeding(mut self, seed_empty: bool) -> Self {
        self.seed_empty = seed_empty;
        self
    }

    /// Run a pass for `profile` after the configured delay.
    pub fn schedule(&self, generation: u64, profile: ResourceId) -> JoinHandle<ReconcileReport> {
        let this = self.clone();
        tracing::debug!(
            generation,
            %profile,
            delay_ms = this.delay.as_millis() as u64,
            "reconciliation scheduled"
        );
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.run_pass(generation, &profile).await
        })
    }

    fn still_current(&self, generation: u64, report: &mut ReconcileReport) -> bool {
        if self.sequencer.is_current(generation) {
            return true;
        }
        tracing::debug!(
            generation,
            current = self.sequencer.current_generation(),
            "reconciliation superseded, stopping"
        );
        report.aborted = true;
        false
    }

    /// One reconciliation pass, valid only while `generation` is current.
    pub async fn run_pass(&self, generation: u64, profile: &ResourceId) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !self.still_current(generation, &mut report) {
            return report;
        }

        let groups = match self.backend.groups().await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(generation, %profile, "reconciliation could not read groups: {e}");
                report.failed.push(format!("groups: {e}"));
                return report;
            }
        };
        if !self.still_current(generation, &mut report) {
            return report;
        }

        let saved = match self.store.read_selections(profile) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(generation, %profile, "reconciliation could not read selections: {e}");
                report.failed.push(format!("selections: {e}"));
                return report;
            }
        };

        if saved.is_empty() {
            if self.seed_empty {
                self.seed(generation, profile, &groups, &mut report);
            } else {
                tracing::debug!(%profile, "no saved selections, nothing to reconcile");
            }
            return report;
        }

        for group in selectors(&groups) {
            let Some(now) = group.now.as_deref() else {
                continue;
            };
            let Some(record) = saved.iter().find(|r| r.group == group.name) else {
                continue;
            };
            if record.member == now {
                continue;
            }
            if !group.has_member(&record.member) {
                tracing::warn!(
                    group = %group.name,
                    member = %record.member,
                    "saved member missing from group, skipping"
                );
                report.skipped.push(group.name.clone());
                continue;
            }
            if !self.still_current(generation, &mut report) {
                return report;
            }
            match self
                .coordinator
                .switch_member(&group.name, &record.member, Some(now), true)
                .await
            {
                Ok(()) => report.applied.push(record.clone()),
                Err(e) => {
                    tracing::warn!(group = %group.name, "reconciliation switch failed: {e}");
                    report.failed.push(format!("{}: {e}", group.name));
                }
            }
        }

        if !report.applied.is_empty() {
            self.write_back(generation, profile, &groups, &saved, &mut report);
        }

        tracing::info!(
            generation,
            %profile,
            applied = report.applied.len(),
            recorded = report.recorded,
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "reconciliation finished"
        );
        report
    }

    /// After a pass that switched something, store the merged view of the
    /// core's groups and the saved records so groups never chosen explicitly
    /// are remembered too. Groups the core no longer reports are dropped.
    fn write_back(
        &self,
        generation: u64,
        profile: &ResourceId,
        groups: &[ProxyGroup],
        saved: &[SelectionRecord],
        report: &mut ReconcileReport,
    ) {
        let merged = merge_selections(groups, saved);
        if !self.still_current(generation, report) {
            return;
        }
        let added = merged
            .iter()
            .filter(|m| !saved.iter().any(|s| s.group == m.group))
            .count();
        match self.store.replace_selections(profile, merged) {
            Ok(()) => report.recorded = added,
            Err(e) => {
                tracing::warn!(%profile, "writing merged selections failed: {e}");
                report.failed.push(format!("selections: {e}"));
            }
        }
    }

    fn seed(
        &self,
        generation: u64,
        profile: &ResourceId,
        groups: &[ProxyGroup],
        report: &mut ReconcileReport,
    ) {
        for group in selectors(groups) {
            let Some(now) = group.now.as_deref() else {
                continue;
            };
            if !self.still_current(generation, report) {
                return;
            }
            match self
                .store
                .write_selection(profile, SelectionRecord::new(&group.name, now))
            {
                Ok(()) => report.seeded += 1,
                Err(e) => {
                    tracing::warn!(group = %group.name, "seeding selection failed: {e}");
                    report.failed.push(format!("{}: {e}", group.name));
                }
            }
        }
        tracing::info!(generation, %profile, seeded = report.seeded, "seeded selections from core state");
    }
}

fn selectors(groups: &[ProxyGroup]) -> impl Iterator<Item = &ProxyGroup> {
    groups
        .iter()
        .filter(|g| g.kind == GroupKind::Selector && g.now.as_deref().is_some_and(|n| !n.is_empty()))
}

/// Selector groups keep their saved member, falling back to the core's.
/// Other groups are listed only when a record already exists.
fn merge_selections(groups: &[ProxyGroup], saved: &[SelectionRecord]) -> Vec<SelectionRecord> {
    groups
        .iter()
        .filter_map(|group| {
            let record = saved.iter().find(|r| r.group == group.name);
            let now = group.now.as_deref().filter(|n| !n.is_empty());
            match (group.kind == GroupKind::Selector, now, record) {
                (true, Some(_), Some(record)) => Some(record.clone()),
                (true, Some(now), None) => Some(SelectionRecord::new(&group.name, now)),
                (_, Some(now), Some(record)) if record.member != now => {
                    Some(SelectionRecord::new(&group.name, now))
                }
                (_, _, Some(record)) => Some(record.clone()),
                _ => None,
            }
        })
        .collect()
}
