//! Instrumented builders and models shared by the fleet and proxy tests.

use super::model_trait::{BuilderKind, Model, ModelBuilder};
use super::registry::Registry;
use crate::error::FleetError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

pub const KNOWN_MODELS: &[&str] = &["alpha", "beta"];

#[derive(Default)]
pub struct TestHooks {
    pub builds: AtomicUsize,
    pub drops: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub events: Mutex<Vec<String>>,
    pub barrier: Option<Arc<Barrier>>,
    pub build_delay: Duration,
}

impl TestHooks {
    pub fn with_barrier(parties: usize) -> Self {
        Self {
            barrier: Some(Arc::new(Barrier::new(parties))),
            ..Default::default()
        }
    }

    pub fn with_build_delay(delay: Duration) -> Self {
        Self {
            build_delay: delay,
            ..Default::default()
        }
    }

    pub fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

pub struct CountingBuilder {
    device: usize,
    hooks: Arc<TestHooks>,
}

impl CountingBuilder {
    pub fn new(device: usize, hooks: Arc<TestHooks>) -> Self {
        Self { device, hooks }
    }
}

#[async_trait]
impl ModelBuilder for CountingBuilder {
    async fn build(&self, model_name: &str) -> anyhow::Result<Box<dyn Model>> {
        if !KNOWN_MODELS.contains(&model_name) {
            return Err(FleetError::ModelNotFound(model_name.to_string()).into());
        }
        self.hooks.record(format!("build-start:{}:{}", model_name, self.device));
        if !self.hooks.build_delay.is_zero() {
            tokio::time::sleep(self.hooks.build_delay).await;
        }
        self.hooks.builds.fetch_add(1, Ordering::SeqCst);
        self.hooks.record(format!("build-end:{}:{}", model_name, self.device));
        Ok(Box::new(ProbeModel {
            name: model_name.to_string(),
            device: self.device,
            hooks: Arc::clone(&self.hooks),
        }))
    }

    fn device(&self) -> usize {
        self.device
    }
}

/// Model whose behavior is steered by the call: `sleep_ms` kwarg delays the
/// reply, a `"barrier"` first argument waits on the shared barrier, methods
/// `fail` and `panic` exercise the error paths.
pub struct ProbeModel {
    name: String,
    device: usize,
    hooks: Arc<TestHooks>,
}

impl ProbeModel {
    fn enter(&self) {
        let now = self.hooks.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.hooks.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.hooks.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Model for ProbeModel {
    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> anyhow::Result<Value> {
        self.enter();
        if args.first() == Some(&json!("barrier")) {
            if let Some(barrier) = &self.hooks.barrier {
                barrier.wait();
            }
        }
        if let Some(ms) = kwargs.get("sleep_ms").and_then(Value::as_u64) {
            std::thread::sleep(Duration::from_millis(ms));
        }
        self.hooks.record(format!("call:{}:{}", self.name, self.device));
        self.exit();
        Ok(json!({"model": self.name, "device": self.device, "args": args}))
    }

    fn call_method(
        &mut self,
        method: &str,
        _args: &[Value],
        _kwargs: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        match method {
            "device" => Ok(json!(self.device)),
            "fail" => Err(anyhow::anyhow!("probe failure on device {}", self.device)),
            "panic" => panic!("probe panic on device {}", self.device),
            other => Err(anyhow::anyhow!("no method '{}'", other)),
        }
    }
}

impl Drop for ProbeModel {
    fn drop(&mut self) {
        self.hooks.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registry exposing `CountingBuilder` as a local and a remote builder class.
pub fn test_registry(hooks: Arc<TestHooks>) -> Arc<Registry> {
    let registry = Registry::with_defaults();
    let local_hooks = Arc::clone(&hooks);
    registry.register_builder("CountingBuilder", BuilderKind::Local, move |_, device, _| {
        Ok(Box::new(CountingBuilder::new(device, Arc::clone(&local_hooks))) as Box<dyn ModelBuilder>)
    });
    let remote_hooks = hooks;
    registry.register_builder("RemoteCountingBuilder", BuilderKind::Remote, move |_, device, _| {
        Ok(Box::new(CountingBuilder::new(device, Arc::clone(&remote_hooks))) as Box<dyn ModelBuilder>)
    });
    registry.register_builder("BrokenBuilder", BuilderKind::Local, |_, device, _| {
        Err(anyhow::anyhow!("no accelerator at index {}", device))
    });
    Arc::new(registry)
}
