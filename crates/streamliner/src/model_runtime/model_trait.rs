use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A built model instance, owned by exactly one device worker.
pub trait Model: Send {
    /// Invoke the model object itself.
    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> anyhow::Result<Value>;

    /// Invoke a named method on the model.
    fn call_method(
        &mut self,
        method: &str,
        _args: &[Value],
        _kwargs: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("model does not expose method '{}'", method))
    }
}

/// Turns a configured model name into a callable instance bound to one device.
#[async_trait]
pub trait ModelBuilder: Send + Sync {
    /// Build `model_name`. Fails with `FleetError::ModelNotFound` when the
    /// name is not configured.
    async fn build(&self, model_name: &str) -> anyhow::Result<Box<dyn Model>>;

    /// Device this builder places models on.
    fn device(&self) -> usize;
}

/// Whether building needs remote artifact acquisition first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuilderKind {
    Local,
    Remote,
}

impl BuilderKind {
    pub fn is_remote(&self) -> bool {
        matches!(self, BuilderKind::Remote)
    }
}

/// Builder class name and its constructor parameters, handed to every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub class: String,
    #[serde(default)]
    pub init_params: Map<String, Value>,
}

impl BuilderConfig {
    pub fn new(class: impl Into<String>, init_params: Map<String, Value>) -> Self {
        Self {
            class: class.into(),
            init_params,
        }
    }

    /// Catalog path shared by the builders and the proxy allow-list.
    pub fn catalog_path(&self) -> Option<&str> {
        self.init_params.get("path_to_cfg").and_then(Value::as_str)
    }
}
