//! The contract the orchestrator needs from the proxy core, plus the
//! dependent tray mirror and the connection-draining side effect.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::ResourceId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

// ---------------------------------------------------------------------------
// Wire-neutral data model
// ---------------------------------------------------------------------------

/// What `apply_selection` switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Reload the core with a whole profile.
    Profile(ResourceId),
    /// Select `member` inside the already-loaded `group`.
    Member { group: String, member: String },
}

impl fmt::Display for ApplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyTarget::Profile(id) => write!(f, "profile {id}"),
            ApplyTarget::Member { group, member } => write!(f, "{group} -> {member}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Selector,
    UrlTest,
    Fallback,
    LoadBalance,
    Relay,
    Other,
}

impl GroupKind {
    /// Map the core's `type` string. Unknown kinds are `Other`.
    pub fn from_core(kind: &str) -> Self {
        match kind {
            "Selector" => GroupKind::Selector,
            "URLTest" => GroupKind::UrlTest,
            "Fallback" => GroupKind::Fallback,
            "LoadBalance" => GroupKind::LoadBalance,
            "Relay" => GroupKind::Relay,
            _ => GroupKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyGroup {
    pub name: String,
    pub kind: GroupKind,
    /// Currently selected member as reported by the core.
    pub now: Option<String>,
    /// Every member the group can select.
    pub members: Vec<String>,
}

impl ProxyGroup {
    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    /// Routing chain, outermost proxy first.
    pub chain: Vec<String>,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProxyBackend: Send + Sync {
    /// Idempotent from the caller's side; may be slow.
    async fn apply_selection(&self, target: &ApplyTarget) -> BackendResult<()>;

    async fn groups(&self) -> BackendResult<Vec<ProxyGroup>>;

    async fn list_connections(&self) -> BackendResult<Vec<Connection>>;

    async fn close_connection(&self, id: &str) -> BackendResult<()>;
}

/// A surface that mirrors the active selection (e.g. the tray menu).
#[async_trait]
pub trait SelectionMirror: Send + Sync {
    async fn sync_selection(&self) -> std::result::Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMirror;

#[async_trait]
impl SelectionMirror for NoopMirror {
    async fn sync_selection(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection draining
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainFilter {
    All,
    /// Connections whose routing chain passes through this member.
    ThroughMember(String),
}

impl DrainFilter {
    fn matches(&self, conn: &Connection) -> bool {
        match self {
            DrainFilter::All => true,
            DrainFilter::ThroughMember(member) => conn.chain.iter().any(|c| c == member),
        }
    }
}

/// Close every live connection matching `filter`.
///
/// Closes run concurrently and all are awaited; a failed close is logged and
/// does not stop the others. Returns how many closes succeeded.
pub async fn drain_connections(
    backend: &dyn ProxyBackend,
    filter: &DrainFilter,
) -> BackendResult<usize> {
    let connections = backend.list_connections().await?;
    let targets: Vec<&Connection> = connections.iter().filter(|c| filter.matches(c)).collect();
    if targets.is_empty() {
        return Ok(0);
    }

    let results =
        futures::future::join_all(targets.iter().map(|c| backend.close_connection(&c.id))).await;

    let mut closed = 0;
    for (conn, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => closed += 1,
            Err(e) => tracing::warn!(connection = %conn.id, "failed to close connection: {e}"),
        }
    }
    tracing::info!(closed, matched = targets.len(), "drained connections");
    Ok(closed)
}
