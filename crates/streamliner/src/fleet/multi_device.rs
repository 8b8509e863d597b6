//! Multi-device fleet
//!
//! Owns one worker per device index, the device slots the load balancer
//! routes through, and (for remote builders) the fleet-wide readiness map.

use super::device_worker::DeviceWorker;
use super::load_balancer::{DeviceSlot, LoadBalancer};
use super::readiness::ReadinessMap;
use super::signal::CompletionSignal;
use crate::envelope::CallEnvelope;
use crate::error::FleetError;
use crate::model_runtime::{load_catalog, BuilderConfig, Registry};
use crate::proxy::{CallExecutor, ModelProxy};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct FleetOptions {
    /// Upper bound on waiting for a device's reply; `None` waits indefinitely.
    pub dispatch_timeout: Option<Duration>,
}

pub struct MultiDeviceFleet {
    device_indices: Vec<usize>,
    builder_config: BuilderConfig,
    workers: Vec<DeviceWorker>,
    balancer: Arc<LoadBalancer>,
}

impl MultiDeviceFleet {
    pub async fn start(
        device_indices: Vec<usize>,
        builder_config: BuilderConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, FleetError> {
        Self::start_with_options(device_indices, builder_config, registry, FleetOptions::default()).await
    }

    /// Spawn one worker per device and wait until each has constructed its
    /// builder. Any failure stops the workers already started.
    pub async fn start_with_options(
        device_indices: Vec<usize>,
        builder_config: BuilderConfig,
        registry: Arc<Registry>,
        options: FleetOptions,
    ) -> Result<Self, FleetError> {
        if device_indices.is_empty() {
            return Err(FleetError::Config("at least one device index is required".to_string()));
        }
        let unique: HashSet<usize> = device_indices.iter().copied().collect();
        if unique.len() != device_indices.len() {
            return Err(FleetError::Config(format!(
                "duplicate device indices in {:?}",
                device_indices
            )));
        }
        let kind = registry.builder_kind(&builder_config.class)?;

        info!(
            "Starting fleet on devices {:?} with {} ({:?})",
            device_indices, builder_config.class, kind
        );

        let mut workers = Vec::with_capacity(device_indices.len());
        let mut slots = Vec::with_capacity(device_indices.len());
        let mut pending = Vec::with_capacity(device_indices.len());
        for &device in &device_indices {
            let signal = Arc::new(CompletionSignal::new());
            let (ready_tx, ready_rx) = oneshot::channel();
            let (worker, channel) = DeviceWorker::spawn(
                device,
                builder_config.clone(),
                Arc::clone(&registry),
                Arc::clone(&signal),
                ready_tx,
            )?;
            workers.push(worker);
            slots.push(DeviceSlot::new(device, channel, signal));
            pending.push((device, ready_rx));
        }

        let readiness = kind.is_remote().then(|| Arc::new(ReadinessMap::new()));
        let mut fleet = Self {
            device_indices,
            builder_config,
            workers,
            balancer: Arc::new(LoadBalancer::new(slots, readiness, options.dispatch_timeout)),
        };

        for (device, ready_rx) in pending {
            let outcome = ready_rx
                .await
                .unwrap_or_else(|_| Err("worker exited during startup".to_string()));
            if let Err(message) = outcome {
                error!("Device {} failed to start: {}", device, message);
                fleet.stop().await;
                return Err(FleetError::Worker { device, message });
            }
        }

        info!("Fleet started with {} device worker(s)", fleet.workers.len());
        Ok(fleet)
    }

    pub fn device_indices(&self) -> &[usize] {
        &self.device_indices
    }

    pub fn builder_config(&self) -> &BuilderConfig {
        &self.builder_config
    }

    /// Whether first-build coordination is active (remote builders only).
    pub fn coordinates_builds(&self) -> bool {
        self.balancer.readiness().is_some()
    }

    pub fn readiness(&self) -> Option<&Arc<ReadinessMap>> {
        self.balancer.readiness()
    }

    pub async fn dispatch(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        self.balancer.dispatch(envelope).await
    }

    /// The dispatch callable to hand to proxies or a server.
    pub fn executor(&self) -> Arc<dyn CallExecutor> {
        self.balancer.clone()
    }

    /// Proxy over this fleet using the builder's model catalog as metadata.
    pub fn model_proxy(&self) -> Result<ModelProxy, FleetError> {
        let path = self.builder_config.catalog_path().ok_or_else(|| {
            FleetError::Config("builder init_params has no path_to_cfg".to_string())
        })?;
        let catalog = load_catalog(Path::new(path))?;
        Ok(ModelProxy::new(catalog, self.executor()))
    }

    pub fn running_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Send the shutdown sentinel to every worker and join them all.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let delivered = self.balancer.shutdown_all().await;
        info!("Stopping fleet: shutdown sent to {}/{} worker(s)", delivered, self.workers.len());

        let workers = std::mem::take(&mut self.workers);
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(|mut worker| (worker.device(), worker.join()))
                .collect::<Vec<_>>()
        })
        .await;

        match joined {
            Ok(results) => {
                for (device, clean) in results {
                    if !clean {
                        warn!("Device worker {} had panicked before shutdown", device);
                    }
                }
            }
            Err(e) => error!("Failed to join device workers: {}", e),
        }
        info!("Fleet stopped");
    }
}
