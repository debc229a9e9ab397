use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Where the proxy core's external controller listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_controller_url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// The core's mixed proxy port, used when an import retries through the core.
    #[serde(default = "default_mixed_port")]
    pub mixed_port: u16,
}

fn default_controller_url() -> String {
    "http://127.0.0.1:9097".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_mixed_port() -> u16 {
    7897
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: default_controller_url(),
            secret: None,
            timeout_ms: default_timeout_ms(),
            mixed_port: default_mixed_port(),
        }
    }
}

impl ControllerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ActivationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Delay between a committed profile switch and the reconciliation pass.
    #[serde(default = "default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,
    /// Record the core's current selector state when a profile has none saved.
    #[serde(default = "default_true")]
    pub seed_empty_selections: bool,
    /// Drop live connections after switching to a different profile.
    #[serde(default = "default_true")]
    pub close_connections_on_switch: bool,
}

fn default_reconcile_delay_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            reconcile_delay_ms: default_reconcile_delay_ms(),
            seed_empty_selections: true,
            close_connections_on_switch: true,
        }
    }
}

impl ActivationConfig {
    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// SelectionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// User preference: close connections through the member being replaced.
    #[serde(default)]
    pub auto_close_connection: bool,
    /// Host-level switch for the cleanup side effect.
    #[serde(default = "default_true")]
    pub enable_connection_cleanup: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            auto_close_connection: false,
            enable_connection_cleanup: true,
        }
    }
}

impl SelectionConfig {
    pub fn cleanup_enabled(&self) -> bool {
        self.auto_close_connection && self.enable_connection_cleanup
    }
}

// ---------------------------------------------------------------------------
// NoticeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
}

fn default_dedup_window_ms() -> u64 {
    5_000
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: default_dedup_window_ms(),
        }
    }
}

impl NoticeConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Commands (argv lists) and timings for the background service sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reinstall: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uninstall: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_core: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restart_core: Vec<String>,
    /// Exit status 0 means the service is installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,
    #[serde(default = "default_core_stop_ms")]
    pub core_stop_ms: u64,
    #[serde(default = "default_state_update_ms")]
    pub state_update_ms: u64,
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,
}

fn default_stabilization_ms() -> u64 {
    800
}

fn default_core_stop_ms() -> u64 {
    400
}

fn default_state_update_ms() -> u64 {
    500
}

fn default_verify_attempts() -> u32 {
    5
}

fn default_verify_delay_ms() -> u64 {
    1_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            install: Vec::new(),
            reinstall: Vec::new(),
            uninstall: Vec::new(),
            stop_core: Vec::new(),
            restart_core: Vec::new(),
            status: Vec::new(),
            stabilization_ms: default_stabilization_ms(),
            core_stop_ms: default_core_stop_ms(),
            state_update_ms: default_state_update_ms(),
            verify_attempts: default_verify_attempts(),
            verify_delay_ms: default_verify_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub notices: NoticeConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            controller: ControllerConfig::default(),
            activation: ActivationConfig::default(),
            selection: SelectionConfig::default(),
            notices: NoticeConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Config {
    /// Load `<root>/config.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let url = self.controller.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("controller.url '{url}' must start with http:// or https://"),
            });
        }

        if self.controller.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "controller.timeout_ms is 0; backend calls will fail immediately".into(),
            });
        }

        if self.activation.reconcile_delay_ms > 10_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "activation.reconcile_delay_ms={} (>10s is unusual)",
                    self.activation.reconcile_delay_ms
                ),
            });
        }

        if self.selection.auto_close_connection && !self.selection.enable_connection_cleanup {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "selection.auto_close_connection has no effect while \
                          enable_connection_cleanup is false"
                    .into(),
            });
        }

        if self.service.verify_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "service.verify_attempts must be at least 1".into(),
            });
        }

        for (name, argv) in [
            ("install", &self.service.install),
            ("reinstall", &self.service.reinstall),
            ("uninstall", &self.service.uninstall),
            ("stop_core", &self.service.stop_core),
            ("restart_core", &self.service.restart_core),
            ("status", &self.service.status),
        ] {
            if argv.first().is_some_and(|program| program.trim().is_empty()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("service.{name} has an empty program name"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.controller.url, "http://127.0.0.1:9097");
        assert_eq!(parsed.activation.reconcile_delay_ms, 50);
        assert!(parsed.activation.seed_empty_selections);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.notices.dedup_window_ms, 5_000);
        assert_eq!(cfg.service.verify_attempts, 5);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "controller:\n  url: http://10.0.0.2:9090\nselection:\n  auto_close_connection: true\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.controller.url, "http://10.0.0.2:9090");
        assert_eq!(cfg.controller.timeout_ms, 10_000);
        assert!(cfg.selection.cleanup_enabled());
        assert_eq!(cfg.service.stabilization_ms, 800);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.controller.secret = Some("s3cret".into());
        cfg.service.install = vec!["svcctl".into(), "install".into()];
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.controller.secret.as_deref(), Some("s3cret"));
        assert_eq!(loaded.service.install, vec!["svcctl", "install"]);
    }

    #[test]
    fn validate_clean_default() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_url_and_zero_attempts() {
        let mut cfg = Config::default();
        cfg.controller.url = "127.0.0.1:9097".into();
        cfg.service.verify_attempts = 0;
        let warnings = cfg.validate();
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.level == WarnLevel::Error)
                .count(),
            2
        );
    }

    #[test]
    fn validate_flags_ineffective_cleanup() {
        let mut cfg = Config::default();
        cfg.selection.auto_close_connection = true;
        cfg.selection.enable_connection_cleanup = false;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("auto_close_connection")));
    }
}
