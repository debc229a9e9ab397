//! Wiring shared by every subcommand: config, store, backend, notices.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_core::backend::NoopMirror;
use switchyard_core::config::Config;
use switchyard_core::notify::{DedupNotifier, Notifier, TracingNotifier};
use switchyard_core::store::FileSelectionStore;
use switchyard_core::types::Severity;
use switchyard_core::Orchestrator;
use switchyard_mihomo::{MihomoBackend, MihomoClient};

/// Prints notices to stderr so stdout stays clean for `--json`.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn emit(&self, severity: Severity, message: &str) {
        tracing::debug!(notice = %severity, "{message}");
        eprintln!("{severity}: {message}");
    }
}

pub struct Host {
    pub root: PathBuf,
    pub config: Config,
    pub store: Arc<FileSelectionStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Host {
    /// With `json`, notices become log lines instead of console text.
    pub fn open(root: &Path, json: bool) -> anyhow::Result<Self> {
        let config = Config::load(root)
            .with_context(|| format!("failed to load config from {}", root.display()))?;
        let store = Arc::new(FileSelectionStore::new(root));
        let window = config.notices.dedup_window();
        let notifier: Arc<dyn Notifier> = if json {
            Arc::new(DedupNotifier::new(TracingNotifier, window))
        } else {
            Arc::new(DedupNotifier::new(ConsoleNotifier, window))
        };
        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            notifier,
        })
    }

    pub fn client(&self) -> anyhow::Result<MihomoClient> {
        MihomoClient::new(&self.config.controller).context("invalid controller settings")
    }

    pub fn backend(&self) -> anyhow::Result<Arc<MihomoBackend>> {
        Ok(Arc::new(MihomoBackend::new(
            self.client()?,
            self.store.clone(),
            &self.root,
        )))
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        Orchestrator::new(
            &self.config,
            self.store.clone(),
            self.backend()?,
            Arc::new(NoopMirror),
            Arc::clone(&self.notifier),
        )
        .context("failed to start orchestrator")
    }
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start tokio runtime")
}
