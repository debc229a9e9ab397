use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SwitchError};

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

/// Identifier of an activatable resource (a profile uid).
///
/// Guaranteed non-empty and free of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SwitchError::Validation("resource id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = SwitchError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SelectionRecord
// ---------------------------------------------------------------------------

/// The remembered member choice for one proxy group inside a profile.
///
/// Serialized with the `name` / `now` keys the proxy core itself uses for
/// group state, so a record reads the same as the group it mirrors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    #[serde(rename = "name")]
    pub group: String,
    #[serde(rename = "now")]
    pub member: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SelectionRecord {
    pub fn new(group: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            member: member.into(),
            updated_at: Some(Utc::now()),
        }
    }

    /// Same group and member, ignoring the timestamp.
    pub fn same_choice(&self, other: &SelectionRecord) -> bool {
        self.group == other.group && self.member == other.member
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_rejects_blank() {
        assert!(matches!(
            ResourceId::new("   "),
            Err(SwitchError::Validation(_))
        ));
        assert!(ResourceId::new("").is_err());
    }

    #[test]
    fn resource_id_trims() {
        let id = ResourceId::new("  profileX ").unwrap();
        assert_eq!(id.as_str(), "profileX");
        assert_eq!(id.to_string(), "profileX");
    }

    #[test]
    fn resource_id_deserialize_validates() {
        let ok: ResourceId = serde_yaml::from_str("abc").unwrap();
        assert_eq!(ok.as_str(), "abc");
        let err = serde_yaml::from_str::<ResourceId>("''");
        assert!(err.is_err());
    }

    #[test]
    fn selection_record_uses_core_keys() {
        let rec = SelectionRecord {
            group: "Proxy".into(),
            member: "HK-01".into(),
            updated_at: None,
        };
        let yaml = serde_yaml::to_string(&rec).unwrap();
        assert!(yaml.contains("name: Proxy"));
        assert!(yaml.contains("now: HK-01"));
        assert!(!yaml.contains("updated_at"));
    }

    #[test]
    fn same_choice_ignores_timestamp() {
        let a = SelectionRecord::new("g", "m");
        let mut b = a.clone();
        b.updated_at = None;
        assert!(a.same_choice(&b));
        assert!(!a.same_choice(&SelectionRecord::new("g", "other")));
    }
}
