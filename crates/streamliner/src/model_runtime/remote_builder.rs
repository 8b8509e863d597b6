//! Remote model builder
//!
//! Fetches a model's artifacts from a remote artifact server into the local
//! artifact directory, then delegates to the local build step. Artifacts
//! already present on disk are never fetched again.

use super::local_builder::LocalBuilder;
use super::model_trait::{Model, ModelBuilder};
use super::registry::Registry;
use crate::error::FleetError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteBuilderParams {
    pub path_to_cfg: PathBuf,
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    pub remote_url: String,
}

pub struct RemoteBuilder {
    local: LocalBuilder,
    remote_url: String,
    http_client: reqwest::Client,
}

impl RemoteBuilder {
    pub fn new(local: LocalBuilder, remote_url: impl Into<String>) -> Self {
        Self {
            local,
            remote_url: remote_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_params(
        params: &Map<String, Value>,
        device: usize,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let params: RemoteBuilderParams = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| FleetError::Config(format!("RemoteBuilder parameters: {}", e)))?;
        let local = LocalBuilder::new(&params.path_to_cfg, params.artifact_dir, device, registry)?;
        Ok(Self::new(local, params.remote_url))
    }

    /// Download every artifact of `model_name` that is not yet on disk.
    /// Returns the number of files fetched.
    pub async fn acquire(&self, model_name: &str) -> anyhow::Result<usize> {
        let spec = self.local.spec(model_name)?;
        let mut fetched = 0;
        for file_name in spec.init_files.values() {
            let target = self.local.artifact_path(file_name);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                debug!("Artifact {} already present, skipping fetch", target.display());
                continue;
            }
            self.fetch(file_name, &target).await?;
            fetched += 1;
        }
        Ok(fetched)
    }

    async fn fetch(&self, file_name: &str, target: &Path) -> anyhow::Result<()> {
        let url = format!("{}/{}", self.remote_url, file_name);
        info!("Fetching artifact {} -> {}", url, target.display());

        let resp = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Artifact request failed for {}: {}", url, e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Artifact fetch failed ({}) for {}: {}", status, url, body));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Artifact read failed for {}: {}", url, e))?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Other devices may be fetching the same file; only publish complete files.
        let partial = partial_path(target, self.local.device());
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, target).await?;
        Ok(())
    }
}

/// Download staging path next to `target`: `clip.bin` -> `clip.bin.partial-<device>`.
fn partial_path(target: &Path, device: usize) -> PathBuf {
    let mut name = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".partial-{}", device));
    target.with_file_name(name)
}

#[async_trait]
impl ModelBuilder for RemoteBuilder {
    async fn build(&self, model_name: &str) -> anyhow::Result<Box<dyn Model>> {
        self.acquire(model_name).await?;
        self.local.build_local(model_name)
    }

    fn device(&self) -> usize {
        self.local.device()
    }
}
