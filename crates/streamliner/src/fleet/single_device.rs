//! Single-device model cache
//!
//! A name -> instance arena local to one device worker. Models are built on
//! first access and memoized for the worker's lifetime. No locking: the
//! owning worker is single-threaded.

use crate::envelope::CallEnvelope;
use crate::error::FleetError;
use crate::model_runtime::{Model, ModelBuilder};
use crate::proxy::CallExecutor;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SingleDeviceFleet {
    builder: Box<dyn ModelBuilder>,
    loaded_models: HashMap<String, Box<dyn Model>>,
}

impl SingleDeviceFleet {
    pub fn new(builder: Box<dyn ModelBuilder>) -> Self {
        Self {
            builder,
            loaded_models: HashMap::new(),
        }
    }

    pub fn device(&self) -> usize {
        self.builder.device()
    }

    pub fn is_loaded(&self, model_name: &str) -> bool {
        self.loaded_models.contains_key(model_name)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_models.len()
    }

    /// Build-on-first-access lookup.
    pub async fn resolve(&mut self, model_name: &str) -> anyhow::Result<&mut Box<dyn Model>> {
        if !self.loaded_models.contains_key(model_name) {
            debug!("Model {} not cached on device {}, building", model_name, self.device());
            let model = self.builder.build(model_name).await?;
            self.loaded_models.insert(model_name.to_string(), model);
        }
        self.loaded_models
            .get_mut(model_name)
            .ok_or_else(|| FleetError::ModelNotFound(model_name.to_string()).into())
    }

    /// Resolve the envelope's model and invoke it, or the named method on it.
    pub async fn execute(&mut self, envelope: &CallEnvelope) -> anyhow::Result<Value> {
        let model = self.resolve(&envelope.model_name).await?;
        match envelope.method_name.as_deref() {
            Some(method) => model.call_method(method, &envelope.args, &envelope.kwargs),
            None => model.call(&envelope.args, &envelope.kwargs),
        }
    }
}

/// Runs envelopes against an in-process `SingleDeviceFleet`, so proxies
/// work the same without any worker.
pub struct InProcessExecutor {
    fleet: Mutex<SingleDeviceFleet>,
}

impl InProcessExecutor {
    pub fn new(builder: Box<dyn ModelBuilder>) -> Self {
        Self {
            fleet: Mutex::new(SingleDeviceFleet::new(builder)),
        }
    }
}

#[async_trait]
impl CallExecutor for InProcessExecutor {
    async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        let mut fleet = self.fleet.lock().await;
        fleet
            .execute(&envelope)
            .await
            .map_err(FleetError::from_anyhow)
    }
}
