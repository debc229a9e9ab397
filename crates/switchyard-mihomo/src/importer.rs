//! Subscription download and registration.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::config::ControllerConfig;
use switchyard_core::import::{ImportOptions, ProfileImporter};
use switchyard_core::io::atomic_write;
use switchyard_core::paths;
use switchyard_core::store::{ProfileItem, SelectionStore};
use switchyard_core::types::ResourceId;

use crate::error::{sanitize_body, MihomoError, Result};

const USER_AGENT: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

pub struct HttpImporter {
    root: PathBuf,
    store: Arc<dyn SelectionStore>,
    timeout: Duration,
    mixed_port: u16,
}

pub struct Download {
    pub body: String,
    pub filename: Option<String>,
}

impl HttpImporter {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn SelectionStore>,
        controller: &ControllerConfig,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            timeout: controller.timeout(),
            mixed_port: controller.mixed_port,
        }
    }

    fn client(&self, opts: ImportOptions) -> Result<reqwest::Client> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);
        let builder = if opts.self_proxy {
            let proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{}", self.mixed_port))?;
            builder.proxy(proxy)
        } else {
            builder.no_proxy()
        };
        Ok(builder.build()?)
    }

    pub async fn download(&self, url: &str, opts: ImportOptions) -> Result<Download> {
        let response = self.client(opts)?.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = sanitize_body(&response.text().await.unwrap_or_default());
            return Err(MihomoError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);
        let body = response.text().await?;
        Ok(Download { body, filename })
    }

    fn next_uid(&self) -> Result<ResourceId> {
        let base = format!("r{}", Utc::now().timestamp_millis());
        let mut candidate = ResourceId::new(base.clone())?;
        let mut n = 1;
        while self.store.profile(&candidate)?.is_some() {
            candidate = ResourceId::new(format!("{base}-{n}"))?;
            n += 1;
        }
        Ok(candidate)
    }

    async fn import_inner(&self, url: &str, opts: ImportOptions) -> Result<ResourceId> {
        tracing::info!(url, self_proxy = opts.self_proxy, "downloading profile");
        let download = self.download(url, opts).await?;

        match serde_yaml::from_str::<serde_yaml::Value>(&download.body) {
            Ok(serde_yaml::Value::Mapping(_)) => {}
            Ok(_) => {
                return Err(MihomoError::Decode(
                    "subscription is not a YAML mapping".into(),
                ))
            }
            Err(e) => return Err(MihomoError::Decode(format!("subscription is not YAML: {e}"))),
        }

        let uid = self.next_uid()?;
        let file = format!("{uid}.yaml");
        atomic_write(&paths::profile_file(&self.root, &file), download.body.as_bytes())?;

        let name = download
            .filename
            .or_else(|| Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)))
            .unwrap_or_else(|| "Remote Profile".to_string());
        let mut item = ProfileItem::new(uid.clone(), name);
        item.file = Some(file);
        item.url = Some(url.to_string());
        self.store.upsert_profile(item)?;

        tracing::info!(%uid, "profile registered");
        Ok(uid)
    }
}

#[async_trait]
impl ProfileImporter for HttpImporter {
    async fn import(
        &self,
        url: &str,
        opts: ImportOptions,
    ) -> std::result::Result<ResourceId, String> {
        self.import_inner(url, opts).await.map_err(|e| e.to_string())
    }
}

/// `attachment; filename="work.yaml"` → `work.yaml`
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::store::FileSelectionStore;
    use tempfile::TempDir;

    const SUB: &str = "proxies: []\nproxy-groups:\n  - name: Proxy\n    type: select\n    proxies: [DIRECT]\n";

    fn importer(dir: &TempDir) -> (HttpImporter, Arc<FileSelectionStore>) {
        let store = Arc::new(FileSelectionStore::new(dir.path()));
        (
            HttpImporter::new(dir.path(), store.clone(), &ControllerConfig::default()),
            store,
        )
    }

    #[test]
    fn disposition_filename() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="work.yaml""#).as_deref(),
            Some("work.yaml")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[tokio::test]
    async fn import_writes_file_and_registers_profile() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sub")
            .with_status(200)
            .with_header("content-disposition", r#"attachment; filename="Work""#)
            .with_body(SUB)
            .create_async()
            .await;
        let (importer, store) = importer(&dir);

        let uid = importer
            .import(&format!("{}/sub", server.url()), ImportOptions::default())
            .await
            .unwrap();

        let item = store.profile(&uid).unwrap().unwrap();
        assert_eq!(item.name, "Work");
        let file = item.file.unwrap();
        let written = std::fs::read_to_string(paths::profile_file(dir.path(), &file)).unwrap();
        assert_eq!(written, SUB);
    }

    #[tokio::test]
    async fn non_yaml_body_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sub")
            .with_status(200)
            .with_body("just a string")
            .create_async()
            .await;
        let (importer, store) = importer(&dir);

        let err = importer
            .import(&format!("{}/sub", server.url()), ImportOptions::default())
            .await
            .unwrap_err();

        assert!(err.contains("not a YAML mapping"));
        assert!(store.snapshot().unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sub")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;
        let (importer, _) = importer(&dir);

        let err = importer
            .import(&format!("{}/sub", server.url()), ImportOptions::default())
            .await
            .unwrap_err();

        assert!(err.contains("403"));
    }
}
