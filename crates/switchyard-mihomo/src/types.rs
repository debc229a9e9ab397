//! Wire shapes of the external-controller API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use switchyard_core::backend::{Connection, GroupKind, ProxyGroup};

/// `GET /proxies`
#[derive(Debug, Default, Deserialize)]
pub struct ProxiesResponse {
    #[serde(default)]
    pub proxies: BTreeMap<String, ProxyEntry>,
}

/// One entry of `GET /proxies`: either a leaf proxy or a group.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub now: Option<String>,
    /// Members; only present on groups.
    #[serde(default)]
    pub all: Vec<String>,
}

impl ProxyEntry {
    pub fn is_group(&self) -> bool {
        !matches!(GroupKind::from_core(&self.kind), GroupKind::Other) || !self.all.is_empty()
    }

    pub fn into_group(self, key: &str) -> ProxyGroup {
        let name = if self.name.is_empty() {
            key.to_string()
        } else {
            self.name
        };
        ProxyGroup {
            name,
            kind: GroupKind::from_core(&self.kind),
            now: self.now.filter(|n| !n.is_empty()),
            members: self.all,
        }
    }
}

/// `GET /connections`. The core sends `null` instead of `[]` when idle.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: Option<Vec<ConnectionEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEntry {
    pub id: String,
    #[serde(default)]
    pub chains: Vec<String>,
}

impl From<ConnectionEntry> for Connection {
    fn from(c: ConnectionEntry) -> Self {
        Connection {
            id: c.id,
            chain: c.chains,
        }
    }
}

/// `GET /version`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VersionResponse {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub meta: bool,
}

/// Body of `PUT /configs`.
#[derive(Debug, Serialize)]
pub struct ReloadRequest<'a> {
    pub path: &'a str,
}

/// Body of `PUT /proxies/{group}`.
#[derive(Debug, Serialize)]
pub struct SelectRequest<'a> {
    pub name: &'a str,
}
