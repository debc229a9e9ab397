//! `ProxyBackend` over the external controller.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_core::backend::{
    ApplyTarget, BackendError, BackendResult, Connection, ProxyBackend, ProxyGroup,
};
use switchyard_core::paths;
use switchyard_core::store::SelectionStore;
use switchyard_core::types::ResourceId;

use crate::client::MihomoClient;

pub struct MihomoBackend {
    client: MihomoClient,
    store: Arc<dyn SelectionStore>,
    root: PathBuf,
}

impl MihomoBackend {
    pub fn new(client: MihomoClient, store: Arc<dyn SelectionStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            store,
            root: root.into(),
        }
    }

    /// Config file the core should load for `id`.
    fn config_file(&self, id: &ResourceId) -> BackendResult<PathBuf> {
        let item = self
            .store
            .profile(id)
            .map_err(|e| BackendError::Rejected(e.to_string()))?
            .ok_or_else(|| BackendError::Rejected(format!("unknown profile: {id}")))?;
        let file = item
            .file
            .ok_or_else(|| BackendError::Rejected(format!("profile {id} has no config file")))?;
        Ok(paths::profile_file(&self.root, &file))
    }
}

#[async_trait]
impl ProxyBackend for MihomoBackend {
    async fn apply_selection(&self, target: &ApplyTarget) -> BackendResult<()> {
        match target {
            ApplyTarget::Profile(id) => {
                let path = self.config_file(id)?;
                self.client.reload_config(&path).await?;
            }
            ApplyTarget::Member { group, member } => {
                self.client.select_proxy(group, member).await?;
            }
        }
        Ok(())
    }

    async fn groups(&self) -> BackendResult<Vec<ProxyGroup>> {
        Ok(self.client.groups().await?)
    }

    async fn list_connections(&self) -> BackendResult<Vec<Connection>> {
        Ok(self.client.connections().await?)
    }

    async fn close_connection(&self, id: &str) -> BackendResult<()> {
        Ok(self.client.close_connection(id).await?)
    }
}
