//! Switching the selected member of one proxy group.
//!
//! Failure policy is fail-forward: if the backend call fails after the new
//! choice was persisted, the record stays. Intent is still correct; the next
//! reconciliation pass or UI refresh brings the backend in line.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{drain_connections, ApplyTarget, DrainFilter, ProxyBackend, SelectionMirror};
use crate::config::SelectionConfig;
use crate::error::{Result, SwitchError};
use crate::store::SelectionStore;
use crate::types::SelectionRecord;

pub struct ProxySwitchCoordinator {
    store: Arc<dyn SelectionStore>,
    backend: Arc<dyn ProxyBackend>,
    mirror: Arc<dyn SelectionMirror>,
    config: SelectionConfig,
    /// Never evicted. Holds one entry per distinct group name switched,
    /// so it is bounded by the groups the core reports.
    group_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProxySwitchCoordinator {
    pub fn new(
        store: Arc<dyn SelectionStore>,
        backend: Arc<dyn ProxyBackend>,
        mirror: Arc<dyn SelectionMirror>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            store,
            backend,
            mirror,
            config,
            group_locks: Mutex::new(HashMap::new()),
        }
    }

    fn group_lock(&self, group: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .group_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(group.to_string()).or_default().clone()
    }

    /// Persist (unless `skip_persist`), apply, mirror, then optionally drain
    /// connections that went through `previous`.
    ///
    /// Calls for the same group are serialized; different groups run freely.
    pub async fn switch_member(
        &self,
        group: &str,
        member: &str,
        previous: Option<&str>,
        skip_persist: bool,
    ) -> Result<()> {
        if group.trim().is_empty() || member.trim().is_empty() {
            return Err(SwitchError::Validation(
                "group and member must not be empty".into(),
            ));
        }

        let lock = self.group_lock(group);
        let _guard = lock.lock().await;
        tracing::info!(group, member, "switching proxy");

        if !skip_persist {
            match self.store.current_profile()? {
                Some(profile) => {
                    self.store
                        .write_selection(&profile, SelectionRecord::new(group, member))?;
                }
                None => tracing::debug!(group, "no current profile, selection not persisted"),
            }
        }

        let target = ApplyTarget::Member {
            group: group.to_string(),
            member: member.to_string(),
        };
        if let Err(e) = self.backend.apply_selection(&target).await {
            tracing::error!(group, member, "proxy switch failed: {e}");
            return Err(e.into());
        }

        if let Err(e) = self.mirror.sync_selection().await {
            tracing::warn!(group, member, "tray mirror sync failed: {e}");
        }

        tracing::info!(group, member, "proxy switch applied");

        if let Some(previous) = previous {
            if self.config.cleanup_enabled() && previous != member {
                let backend = Arc::clone(&self.backend);
                let filter = DrainFilter::ThroughMember(previous.to_string());
                tokio::spawn(async move {
                    if let Err(e) = drain_connections(backend.as_ref(), &filter).await {
                        tracing::warn!("connection cleanup failed: {e}");
                    }
                });
            }
        }

        Ok(())
    }
}
