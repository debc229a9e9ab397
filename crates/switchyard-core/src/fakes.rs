//! Test doubles for the collaborator traits.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::backend::{
    ApplyTarget, BackendError, BackendResult, Connection, GroupKind, ProxyBackend, ProxyGroup,
    SelectionMirror,
};
use crate::error::{Result, SwitchError};
use crate::notify::Notifier;
use crate::store::{ProfileItem, ProfilesDoc, SelectionStore};
use crate::types::{ResourceId, SelectionRecord, Severity};

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages().iter().filter(|(s, _)| *s == severity).count()
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, severity: Severity, message: &str) {
        self.seen.lock().unwrap().push((severity, message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// RecordingMirror
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMirror {
    syncs: AtomicUsize,
    fail: AtomicBool,
    delay: Duration,
}

impl RecordingMirror {
    /// Each sync takes `delay` before it is counted.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let m = Self::default();
        m.fail.store(true, Ordering::SeqCst);
        m
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SelectionMirror for RecordingMirror {
    async fn sync_selection(&self) -> std::result::Result<(), String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.syncs.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err("tray unavailable".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

pub fn selector(name: &str, now: &str, members: &[&str]) -> ProxyGroup {
    ProxyGroup {
        name: name.into(),
        kind: GroupKind::Selector,
        now: Some(now.into()),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

#[derive(Default)]
struct FakeState {
    dispatched: Vec<ApplyTarget>,
    applied: Vec<ApplyTarget>,
    active_profile: Option<ResourceId>,
    groups: Vec<ProxyGroup>,
    profile_groups: HashMap<String, Vec<ProxyGroup>>,
    connections: Vec<Connection>,
    closed: Vec<String>,
    fail_close: HashSet<String>,
    rejected_members: HashMap<String, String>,
    rejected_profiles: HashMap<String, String>,
    member_latency: HashMap<String, Duration>,
    profile_latency: HashMap<String, Duration>,
    groups_calls: usize,
}

/// Scripted proxy core. Applies take effect when the call *completes*, which
/// is what makes out-of-order completion observable in tests.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_groups(&self, groups: Vec<ProxyGroup>) {
        self.state().groups = groups;
    }

    /// Groups the core reports once `profile` has been loaded.
    pub fn set_profile_groups(&self, profile: &str, groups: Vec<ProxyGroup>) {
        self.state().profile_groups.insert(profile.into(), groups);
    }

    pub fn set_connections(&self, connections: Vec<Connection>) {
        self.state().connections = connections;
    }

    pub fn fail_close(&self, id: &str) {
        self.state().fail_close.insert(id.into());
    }

    pub fn reject_member(&self, member: &str, reason: &str) {
        self.state()
            .rejected_members
            .insert(member.into(), reason.into());
    }

    pub fn reject_profile(&self, profile: &str, reason: &str) {
        self.state()
            .rejected_profiles
            .insert(profile.into(), reason.into());
    }

    pub fn set_latency_for_member(&self, member: &str, latency: Duration) {
        self.state().member_latency.insert(member.into(), latency);
    }

    pub fn set_latency_for_profile(&self, profile: &str, latency: Duration) {
        self.state().profile_latency.insert(profile.into(), latency);
    }

    pub fn dispatched(&self) -> Vec<ApplyTarget> {
        self.state().dispatched.clone()
    }

    pub fn applied(&self) -> Vec<ApplyTarget> {
        self.state().applied.clone()
    }

    pub fn member_applies(&self) -> usize {
        self.applied()
            .iter()
            .filter(|t| matches!(t, ApplyTarget::Member { .. }))
            .count()
    }

    pub fn active_profile(&self) -> Option<ResourceId> {
        self.state().active_profile.clone()
    }

    pub fn group_now(&self, group: &str) -> Option<String> {
        self.state()
            .groups
            .iter()
            .find(|g| g.name == group)
            .and_then(|g| g.now.clone())
    }

    pub fn closed_connections(&self) -> Vec<String> {
        self.state().closed.clone()
    }

    pub fn groups_calls(&self) -> usize {
        self.state().groups_calls
    }
}

#[async_trait]
impl ProxyBackend for FakeBackend {
    async fn apply_selection(&self, target: &ApplyTarget) -> BackendResult<()> {
        let (latency, rejection) = {
            let mut s = self.state();
            s.dispatched.push(target.clone());
            match target {
                ApplyTarget::Profile(id) => (
                    s.profile_latency.get(id.as_str()).copied(),
                    s.rejected_profiles.get(id.as_str()).cloned(),
                ),
                ApplyTarget::Member { member, .. } => (
                    s.member_latency.get(member).copied(),
                    s.rejected_members.get(member).cloned(),
                ),
            }
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = rejection {
            return Err(BackendError::Rejected(reason));
        }

        let mut s = self.state();
        s.applied.push(target.clone());
        match target {
            ApplyTarget::Profile(id) => {
                s.active_profile = Some(id.clone());
                if let Some(groups) = s.profile_groups.get(id.as_str()).cloned() {
                    s.groups = groups;
                }
            }
            ApplyTarget::Member { group, member } => {
                if let Some(g) = s.groups.iter_mut().find(|g| &g.name == group) {
                    g.now = Some(member.clone());
                }
            }
        }
        Ok(())
    }

    async fn groups(&self) -> BackendResult<Vec<ProxyGroup>> {
        let mut s = self.state();
        s.groups_calls += 1;
        Ok(s.groups.clone())
    }

    async fn list_connections(&self) -> BackendResult<Vec<Connection>> {
        Ok(self.state().connections.clone())
    }

    async fn close_connection(&self, id: &str) -> BackendResult<()> {
        let mut s = self.state();
        if s.fail_close.contains(id) {
            return Err(BackendError::Rejected(format!("cannot close {id}")));
        }
        s.connections.retain(|c| c.id != id);
        s.closed.push(id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore / FailingStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<ProfilesDoc>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with_profiles(uids: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut doc = store.doc.lock().unwrap();
            for uid in uids {
                doc.items
                    .push(ProfileItem::new(ResourceId::new(*uid).unwrap(), *uid));
            }
        }
        store
    }

    /// Every mutating call, in order, e.g. `current=p1` or `select p1 Proxy=HK`.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.writes.lock().unwrap().push(entry);
    }
}

impl SelectionStore for MemoryStore {
    fn current_profile(&self) -> Result<Option<ResourceId>> {
        Ok(self.doc.lock().unwrap().current.clone())
    }

    fn set_current_profile(&self, id: &ResourceId) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        if doc.find(id).is_none() {
            return Err(SwitchError::ProfileNotFound(id.to_string()));
        }
        doc.current = Some(id.clone());
        self.log(format!("current={id}"));
        Ok(())
    }

    fn read_selections(&self, id: &ResourceId) -> Result<Vec<SelectionRecord>> {
        let doc = self.doc.lock().unwrap();
        doc.find(id)
            .map(|p| p.selected.clone())
            .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))
    }

    fn write_selection(&self, id: &ResourceId, record: SelectionRecord) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        let item = doc
            .find_mut(id)
            .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))?;
        let entry = format!("select {id} {}={}", record.group, record.member);
        item.upsert_selection(record);
        self.log(entry);
        Ok(())
    }

    fn replace_selections(&self, id: &ResourceId, records: Vec<SelectionRecord>) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        let item = doc
            .find_mut(id)
            .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))?;
        let groups: Vec<&str> = records.iter().map(|r| r.group.as_str()).collect();
        let entry = format!("replace {id} [{}]", groups.join(","));
        item.selected = records;
        self.log(entry);
        Ok(())
    }

    fn profile(&self, id: &ResourceId) -> Result<Option<ProfileItem>> {
        Ok(self.doc.lock().unwrap().find(id).cloned())
    }

    fn upsert_profile(&self, item: ProfileItem) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        self.log(format!("profile {}", item.uid));
        match doc.find_mut(&item.uid) {
            Some(existing) => *existing = item,
            None => doc.items.push(item),
        }
        Ok(())
    }
}

/// Wraps a `MemoryStore` and fails every mutating call while armed.
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SwitchError::Persistence("disk full".into()));
        }
        Ok(())
    }
}

impl SelectionStore for FailingStore {
    fn current_profile(&self) -> Result<Option<ResourceId>> {
        self.inner.current_profile()
    }

    fn set_current_profile(&self, id: &ResourceId) -> Result<()> {
        self.check()?;
        self.inner.set_current_profile(id)
    }

    fn read_selections(&self, id: &ResourceId) -> Result<Vec<SelectionRecord>> {
        self.inner.read_selections(id)
    }

    fn write_selection(&self, id: &ResourceId, record: SelectionRecord) -> Result<()> {
        self.check()?;
        self.inner.write_selection(id, record)
    }

    fn replace_selections(&self, id: &ResourceId, records: Vec<SelectionRecord>) -> Result<()> {
        self.check()?;
        self.inner.replace_selections(id, records)
    }

    fn profile(&self, id: &ResourceId) -> Result<Option<ProfileItem>> {
        self.inner.profile(id)
    }

    fn upsert_profile(&self, item: ProfileItem) -> Result<()> {
        self.check()?;
        self.inner.upsert_profile(item)
    }
}
