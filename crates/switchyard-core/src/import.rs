//! Importing a remote profile, with one retry routed through the core itself.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, SwitchError};
use crate::notify::Notifier;
use crate::steps::{OperationStep, StepRunner};
use crate::types::{ResourceId, Severity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Download through the core's own mixed port.
    pub self_proxy: bool,
}

#[async_trait]
pub trait ProfileImporter: Send + Sync {
    /// Download and register the profile at `url`, returning its uid.
    async fn import(&self, url: &str, opts: ImportOptions) -> std::result::Result<ResourceId, String>;
}

pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.len() > scheme.len() && lower.starts_with(scheme))
}

/// Import `url` directly, then once more through the core proxy if the direct
/// attempt fails.
pub async fn import_profile(
    importer: &dyn ProfileImporter,
    runner: &StepRunner,
    notifier: &dyn Notifier,
    url: &str,
) -> Result<ResourceId> {
    let url = url.trim();
    if !is_http_url(url) {
        notifier.emit(Severity::Error, "Invalid Profile URL");
        return Err(SwitchError::Validation(format!(
            "profile url must be http(s): {url}"
        )));
    }

    let imported: Mutex<Option<(ResourceId, ImportOptions)>> = Mutex::new(None);
    let step = OperationStep::with_fallback(
        "import_profile",
        ImportOptions { self_proxy: false },
        ImportOptions { self_proxy: true },
        |opts| {
            let imported = &imported;
            async move {
                let uid = importer.import(url, opts).await?;
                *imported.lock().unwrap_or_else(PoisonError::into_inner) = Some((uid, opts));
                Ok::<(), String>(())
            }
        },
        |first: &String| {
            tracing::warn!(url, "direct import failed, retrying through core proxy: {first}");
            notifier.emit(Severity::Info, "Import failed, retrying with core proxy...");
        },
    );

    if let Err(e) = runner.run_sequence(vec![step]).await {
        let message = format!("Import failed even with core proxy: {}", e.cause);
        notifier.emit(Severity::Error, &message);
        return Err(SwitchError::Import(e.cause));
    }

    let (uid, opts) = imported
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .ok_or_else(|| SwitchError::Import("importer returned no profile".into()))?;

    if opts.self_proxy {
        notifier.emit(Severity::Success, "Profile Imported with core proxy");
    } else {
        notifier.emit(Severity::Success, "Profile Imported Successfully");
    }
    tracing::info!(%uid, self_proxy = opts.self_proxy, "profile imported");
    Ok(uid)
}
