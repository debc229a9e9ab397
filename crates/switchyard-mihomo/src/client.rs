//! Typed client for the mihomo external controller.

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use switchyard_core::backend::{Connection, ProxyGroup};
use switchyard_core::config::ControllerConfig;

use crate::error::{sanitize_body, MihomoError, Result};
use crate::types::{
    ConnectionsResponse, ProxiesResponse, ReloadRequest, SelectRequest, VersionResponse,
};

#[derive(Debug, Clone)]
pub struct MihomoClient {
    http: reqwest::Client,
    base: Url,
    secret: Option<String>,
}

impl MihomoClient {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| MihomoError::Config(format!("controller url '{}': {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(MihomoError::Config(format!(
                "controller url '{}' cannot carry a path",
                config.url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base,
            secret: config.secret.clone().filter(|s| !s.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                MihomoError::Config(format!("controller url '{}' cannot carry a path", self.base))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = sanitize_body(&response.text().await.unwrap_or_default());
        Err(MihomoError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            MihomoError::Decode(format!("{e}; body: {}", sanitize_body(&body)))
        })
    }

    pub async fn version(&self) -> Result<VersionResponse> {
        self.get_json(&["version"]).await
    }

    /// Reload the running core from the config file at `path`.
    pub async fn reload_config(&self, path: &Path) -> Result<()> {
        let mut url = self.endpoint(&["configs"])?;
        url.query_pairs_mut().append_pair("force", "true");
        let path = path.to_string_lossy();
        tracing::debug!(%path, "reloading core config");
        self.send(
            self.request(Method::PUT, url)
                .json(&ReloadRequest { path: &path }),
        )
        .await?;
        Ok(())
    }

    pub async fn select_proxy(&self, group: &str, name: &str) -> Result<()> {
        let url = self.endpoint(&["proxies", group])?;
        tracing::debug!(group, name, "selecting proxy");
        self.send(self.request(Method::PUT, url).json(&SelectRequest { name }))
            .await?;
        Ok(())
    }

    /// Every group the core reports, leaf proxies excluded.
    pub async fn groups(&self) -> Result<Vec<ProxyGroup>> {
        let resp: ProxiesResponse = self.get_json(&["proxies"]).await?;
        Ok(resp
            .proxies
            .into_iter()
            .filter(|(_, entry)| entry.is_group())
            .map(|(key, entry)| entry.into_group(&key))
            .collect())
    }

    pub async fn connections(&self) -> Result<Vec<Connection>> {
        let resp: ConnectionsResponse = self.get_json(&["connections"]).await?;
        Ok(resp
            .connections
            .unwrap_or_default()
            .into_iter()
            .map(Connection::from)
            .collect())
    }

    pub async fn close_connection(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["connections", id])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
