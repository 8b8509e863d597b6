//! Class registry
//!
//! Maps class names to constructors for models and for model builders.
//! Builder entries also record whether the builder is remote, which is what
//! the fleet consults to decide if build-readiness coordination is needed.

use super::echo_model::EchoModel;
use super::local_builder::LocalBuilder;
use super::model_trait::{BuilderConfig, BuilderKind, Model, ModelBuilder};
use super::remote_builder::RemoteBuilder;
use crate::error::FleetError;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub type ModelFactory =
    Arc<dyn Fn(&Map<String, Value>) -> anyhow::Result<Box<dyn Model>> + Send + Sync>;

/// Constructor for a builder: `(init_params, device, registry)`.
pub type BuilderFactory = Arc<
    dyn Fn(&Map<String, Value>, usize, Arc<Registry>) -> anyhow::Result<Box<dyn ModelBuilder>>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct BuilderEntry {
    kind: BuilderKind,
    factory: BuilderFactory,
}

#[derive(Default)]
pub struct Registry {
    models: DashMap<String, ModelFactory>,
    builders: DashMap<String, BuilderEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock builders and the echo diagnostic model.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_builder("LocalBuilder", BuilderKind::Local, |params, device, registry| {
            Ok(Box::new(LocalBuilder::from_params(params, device, registry)?) as Box<dyn ModelBuilder>)
        });
        registry.register_builder("RemoteBuilder", BuilderKind::Remote, |params, device, registry| {
            Ok(Box::new(RemoteBuilder::from_params(params, device, registry)?) as Box<dyn ModelBuilder>)
        });
        registry.register_model("EchoModel", |params| {
            Ok(Box::new(EchoModel::from_params(params)) as Box<dyn Model>)
        });
        registry
    }

    pub fn register_model<F>(&self, class_name: &str, factory: F)
    where
        F: Fn(&Map<String, Value>) -> anyhow::Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        debug!("Registering model class {}", class_name);
        self.models.insert(class_name.to_string(), Arc::new(factory));
    }

    pub fn register_builder<F>(&self, class_name: &str, kind: BuilderKind, factory: F)
    where
        F: Fn(&Map<String, Value>, usize, Arc<Registry>) -> anyhow::Result<Box<dyn ModelBuilder>>
            + Send
            + Sync
            + 'static,
    {
        debug!("Registering {:?} builder class {}", kind, class_name);
        self.builders.insert(
            class_name.to_string(),
            BuilderEntry {
                kind,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn builder_kind(&self, class_name: &str) -> Result<BuilderKind, FleetError> {
        self.builders
            .get(class_name)
            .map(|entry| entry.kind)
            .ok_or_else(|| FleetError::UnknownClass(class_name.to_string()))
    }

    /// Construct a model by class name.
    pub fn build_model(
        &self,
        class_name: &str,
        params: &Map<String, Value>,
    ) -> anyhow::Result<Box<dyn Model>> {
        // Clone the factory out so the shard lock is not held while constructing.
        let factory = self
            .models
            .get(class_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FleetError::UnknownClass(class_name.to_string()))?;
        factory(params)
    }

    /// Construct the configured builder for one device.
    pub fn build_builder(
        self: &Arc<Self>,
        config: &BuilderConfig,
        device: usize,
    ) -> anyhow::Result<Box<dyn ModelBuilder>> {
        let entry = self
            .builders
            .get(&config.class)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FleetError::UnknownClass(config.class.clone()))?;
        (entry.factory)(&config.init_params, device, Arc::clone(self))
    }
}
