//! Local model builder
//!
//! Builds models from the catalog using artifacts already on disk.

use super::catalog::{load_catalog, ModelCatalog, ModelSpec};
use super::model_trait::{Model, ModelBuilder};
use super::registry::Registry;
use crate::error::FleetError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalBuilderParams {
    pub path_to_cfg: PathBuf,
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

pub struct LocalBuilder {
    device: usize,
    catalog: ModelCatalog,
    artifact_dir: PathBuf,
    registry: Arc<Registry>,
}

impl LocalBuilder {
    pub fn new(
        path_to_cfg: &Path,
        artifact_dir: Option<PathBuf>,
        device: usize,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let catalog = load_catalog(path_to_cfg)?;
        let artifact_dir = artifact_dir.unwrap_or_else(|| {
            path_to_cfg
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        });
        Ok(Self {
            device,
            catalog,
            artifact_dir,
            registry,
        })
    }

    pub fn from_params(
        params: &Map<String, Value>,
        device: usize,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let params: LocalBuilderParams = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| FleetError::Config(format!("LocalBuilder parameters: {}", e)))?;
        Self::new(&params.path_to_cfg, params.artifact_dir, device, registry)
    }

    pub fn spec(&self, model_name: &str) -> Result<&ModelSpec, FleetError> {
        self.catalog
            .get(model_name)
            .ok_or_else(|| FleetError::ModelNotFound(model_name.to_string()))
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.artifact_dir.join(file_name)
    }

    /// Constructor parameters with artifact paths and the device injected.
    fn resolve_params(&self, model_name: &str, spec: &ModelSpec) -> anyhow::Result<Map<String, Value>> {
        let mut params = spec.init_params.clone();
        for (param, file_name) in &spec.init_files {
            let path = self.artifact_path(file_name);
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Required artifact '{}' for model '{}' not found at {}",
                    file_name,
                    model_name,
                    path.display()
                ));
            }
            params.insert(param.clone(), Value::String(path.to_string_lossy().to_string()));
        }
        params.insert("device".to_string(), Value::from(self.device));
        Ok(params)
    }

    pub(crate) fn build_local(&self, model_name: &str) -> anyhow::Result<Box<dyn Model>> {
        let spec = self.spec(model_name)?;
        let params = self.resolve_params(model_name, spec)?;
        debug!("Building {} ({}) on device {}", model_name, spec.model_class, self.device);
        let model = self.registry.build_model(&spec.model_class, &params)?;
        info!("Built model {} on device {}", model_name, self.device);
        crate::metrics::inc_build(model_name);
        Ok(model)
    }
}

#[async_trait]
impl ModelBuilder for LocalBuilder {
    async fn build(&self, model_name: &str) -> anyhow::Result<Box<dyn Model>> {
        self.build_local(model_name)
    }

    fn device(&self) -> usize {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_catalog(dir: &Path) -> PathBuf {
        let path = dir.join("model_cfg.json");
        fs::write(
            &path,
            json!({
                "echo": {"model_class": "EchoModel", "init_params": {"label": "e"}},
                "weighted": {
                    "model_class": "EchoModel",
                    "init_files": {"weights": "weights.bin"}
                }
            })
            .to_string(),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_build_injects_device() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_catalog(dir.path());
        let builder = LocalBuilder::new(&cfg, None, 2, Arc::new(Registry::with_defaults())).unwrap();

        let mut model = builder.build("echo").await.unwrap();
        assert_eq!(model.call_method("device", &[], &Map::new()).unwrap(), json!(2));
        assert_eq!(builder.device(), 2);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_catalog(dir.path());
        let builder = LocalBuilder::new(&cfg, None, 0, Arc::new(Registry::with_defaults())).unwrap();

        let err = builder.build("resnet").await.err().unwrap();
        assert!(matches!(
            FleetError::from_anyhow(err),
            FleetError::ModelNotFound(name) if name == "resnet"
        ));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_catalog(dir.path());
        let builder = LocalBuilder::new(&cfg, None, 0, Arc::new(Registry::with_defaults())).unwrap();

        let err = builder.build("weighted").await.err().unwrap();
        assert!(err.to_string().contains("weights.bin"));

        fs::write(dir.path().join("weights.bin"), b"w").unwrap();
        assert!(builder.build("weighted").await.is_ok());
    }

    #[test]
    fn test_params_require_catalog_path() {
        let err = LocalBuilder::from_params(&Map::new(), 0, Arc::new(Registry::new()))
            .err()
            .unwrap();
        assert!(matches!(FleetError::from_anyhow(err), FleetError::Config(_)));
    }
}
