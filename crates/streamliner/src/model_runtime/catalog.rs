//! Model catalog
//!
//! The JSON file mapping model names to their class, constructor parameters,
//! artifact files and proxy allow-list. The fleet core only interprets
//! `proxy_methods`; everything else is passed through to the builder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Configuration of one named model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_class: String,
    #[serde(default)]
    pub init_params: Map<String, Value>,
    /// Constructor parameter name -> artifact file name.
    #[serde(default)]
    pub init_files: BTreeMap<String, String>,
    #[serde(default)]
    pub proxy_methods: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelSpec {
    pub fn allows_method(&self, method: &str) -> bool {
        self.proxy_methods.iter().any(|m| m == method)
    }
}

pub type ModelCatalog = BTreeMap<String, ModelSpec>;

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { models: ModelCatalog },
    Flat(ModelCatalog),
}

/// Parse a catalog, accepting both a flat mapping and a `{"models": {...}}` wrapper.
pub fn parse_catalog(text: &str) -> anyhow::Result<ModelCatalog> {
    let file: CatalogFile = serde_json::from_str(text)
        .map_err(|e| anyhow::anyhow!("Failed to parse model configuration: {}", e))?;
    Ok(match file {
        CatalogFile::Wrapped { models } => models,
        CatalogFile::Flat(models) => models,
    })
}

pub fn load_catalog(path: &Path) -> anyhow::Result<ModelCatalog> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read model configuration {}: {}", path.display(), e)
    })?;
    let catalog = parse_catalog(&text)?;
    debug!("Loaded {} model(s) from {}", catalog.len(), path.display());
    Ok(catalog)
}
