//! Durable profile state: which profile is current and the remembered group
//! selections inside each profile.
//!
//! The store makes no multi-key transactional promise. Callers order their
//! writes so that a crash between two of them still leaves a correct intent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SwitchError};
use crate::paths;
use crate::types::{ResourceId, SelectionRecord};

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileItem {
    pub uid: ResourceId,
    #[serde(default)]
    pub name: String,
    /// Config file name under `<root>/profiles/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Subscription URL for remote profiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub selected: Vec<SelectionRecord>,
}

impl ProfileItem {
    pub fn new(uid: ResourceId, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            file: None,
            url: None,
            selected: Vec::new(),
        }
    }

    /// Insert or replace the record for `record.group`.
    ///
    /// Returns false when an identical choice was already stored; only its
    /// timestamp is refreshed in that case.
    pub fn upsert_selection(&mut self, mut record: SelectionRecord) -> bool {
        record.updated_at = Some(Utc::now());
        match self.selected.iter_mut().find(|r| r.group == record.group) {
            Some(existing) if existing.same_choice(&record) => {
                existing.updated_at = record.updated_at;
                false
            }
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                self.selected.push(record);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilesDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<ResourceId>,
    #[serde(default)]
    pub items: Vec<ProfileItem>,
}

impl ProfilesDoc {
    pub fn load(root: &Path) -> Result<Self> {
        crate::io::read_yaml_or_default(&paths::profiles_path(root))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::profiles_path(root), data.as_bytes())
    }

    pub fn find(&self, uid: &ResourceId) -> Option<&ProfileItem> {
        self.items.iter().find(|p| &p.uid == uid)
    }

    pub fn find_mut(&mut self, uid: &ResourceId) -> Option<&mut ProfileItem> {
        self.items.iter_mut().find(|p| &p.uid == uid)
    }
}

// ---------------------------------------------------------------------------
// SelectionStore
// ---------------------------------------------------------------------------

/// Read/patch contract the orchestrator needs from durable state.
///
/// Implementations hold any internal lock only for the duration of one call.
pub trait SelectionStore: Send + Sync {
    fn current_profile(&self) -> Result<Option<ResourceId>>;

    fn set_current_profile(&self, id: &ResourceId) -> Result<()>;

    fn read_selections(&self, id: &ResourceId) -> Result<Vec<SelectionRecord>>;

    fn write_selection(&self, id: &ResourceId, record: SelectionRecord) -> Result<()>;

    /// Overwrite the whole selection list of `id` in one write.
    fn replace_selections(&self, id: &ResourceId, records: Vec<SelectionRecord>) -> Result<()>;

    fn profile(&self, id: &ResourceId) -> Result<Option<ProfileItem>>;

    fn upsert_profile(&self, item: ProfileItem) -> Result<()>;
}

/// `SelectionStore` backed by `<root>/profiles.yaml`.
pub struct FileSelectionStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileSelectionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> Result<ProfilesDoc> {
        ProfilesDoc::load(&self.root)
    }

    /// Load, mutate and save under the store lock.
    fn patch<T>(&self, f: impl FnOnce(&mut ProfilesDoc) -> Result<T>) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SwitchError::Persistence("profile store lock poisoned".into()))?;
        let mut doc = ProfilesDoc::load(&self.root)?;
        let out = f(&mut doc)?;
        doc.save(&self.root)?;
        Ok(out)
    }
}

impl SelectionStore for FileSelectionStore {
    fn current_profile(&self) -> Result<Option<ResourceId>> {
        Ok(self.snapshot()?.current)
    }

    fn set_current_profile(&self, id: &ResourceId) -> Result<()> {
        self.patch(|doc| {
            if doc.find(id).is_none() {
                return Err(SwitchError::ProfileNotFound(id.to_string()));
            }
            doc.current = Some(id.clone());
            Ok(())
        })
    }

    fn read_selections(&self, id: &ResourceId) -> Result<Vec<SelectionRecord>> {
        let doc = self.snapshot()?;
        let item = doc
            .find(id)
            .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))?;
        Ok(item.selected.clone())
    }

    fn write_selection(&self, id: &ResourceId, record: SelectionRecord) -> Result<()> {
        self.patch(|doc| {
            let item = doc
                .find_mut(id)
                .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))?;
            if !item.upsert_selection(record) {
                tracing::debug!(profile = %id, "selection unchanged, refreshed timestamp");
            }
            Ok(())
        })
    }

    fn replace_selections(&self, id: &ResourceId, records: Vec<SelectionRecord>) -> Result<()> {
        self.patch(|doc| {
            let item = doc
                .find_mut(id)
                .ok_or_else(|| SwitchError::ProfileNotFound(id.to_string()))?;
            item.selected = records;
            Ok(())
        })
    }

    fn profile(&self, id: &ResourceId) -> Result<Option<ProfileItem>> {
        Ok(self.snapshot()?.find(id).cloned())
    }

    fn upsert_profile(&self, item: ProfileItem) -> Result<()> {
        self.patch(|doc| {
            match doc.find_mut(&item.uid) {
                Some(existing) => {
                    // Keep remembered selections across re-imports.
                    let selected = std::mem::take(&mut existing.selected);
                    *existing = item;
                    if existing.selected.is_empty() {
                        existing.selected = selected;
                    }
                }
                None => doc.items.push(item),
            }
            Ok(())
        })
    }
}
