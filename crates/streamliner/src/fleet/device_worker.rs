//! Per-device worker
//!
//! Each device gets one dedicated, named OS thread running a current-thread
//! tokio runtime. The worker constructs its own builder from the shared
//! `BuilderConfig`, owns its model cache, and serves one request at a time
//! from its channel until it receives the shutdown sentinel.
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::thread::{self, JoinHandle};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, error, debug, warn};
use crate::{
    envelope::CallEnvelope,
    error::FleetError,
    model_runtime::{BuilderConfig, Registry},
};
use super::{signal::CompletionSignal, single_device::SingleDeviceFleet};

/// Messages on the fleet -> worker half of a device channel.
#[derive(Debug)]
pub enum DeviceCommand {
    Call {
        call_id: u64,
        envelope: CallEnvelope,
    },
    Shutdown,
}

/// Messages on the worker -> fleet half of a device channel.
#[derive(Debug)]
pub struct DeviceReply {
    pub call_id: u64,
    pub outcome: Result<Value, FleetError>,
}

/// Fleet-side ends of one device's channel.
pub struct DeviceChannel {
    pub commands: mpsc::Sender<DeviceCommand>,
    pub replies: mpsc::Receiver<DeviceReply>,
}

/// Sets the completion signal when the worker loop ends, for any reason, so
/// a caller waiting on this device observes the closed channel instead of
/// blocking forever.
struct ExitGuard {
    device: usize,
    signal: Arc<CompletionSignal>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Device worker {} panicked", self.device);
        }
        self.signal.set();
    }
}

pub struct DeviceWorker {
    device: usize,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl DeviceWorker {
    /// Spawn the worker thread. `ready` receives the outcome of builder
    /// construction; on failure the thread exits immediately.
    pub fn spawn(
        device: usize,
        builder_config: BuilderConfig,
        registry: Arc<Registry>,
        signal: Arc<CompletionSignal>,
        ready: oneshot::Sender<Result<(), String>>,
    ) -> std::io::Result<(Self, DeviceChannel)> {
        let (command_tx, command_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let name = format!("device-worker-{}", device);

        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exit = ExitGuard { device, signal: signal.clone() };
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready.send(Err(format!("failed to create worker runtime: {}", e)));
                        return;
                    }
                };

                let builder = match registry.build_builder(&builder_config, device) {
                    Ok(builder) => builder,
                    Err(e) => {
                        error!("Device worker {} could not construct {}: {:#}", device, builder_config.class, e);
                        let _ = ready.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                let _ = ready.send(Ok(()));

                let fleet = SingleDeviceFleet::new(builder);
                rt.block_on(Self::run_worker_loop(device, fleet, command_rx, reply_tx, signal, running_clone));
            })?;

        info!("Spawned device worker: {}", name);

        Ok((
            Self {
                device,
                thread_handle: Some(thread_handle),
                running,
            },
            DeviceChannel {
                commands: command_tx,
                replies: reply_rx,
            },
        ))
    }

    async fn run_worker_loop(
        device: usize,
        mut fleet: SingleDeviceFleet,
        mut receiver: mpsc::Receiver<DeviceCommand>,
        replies: mpsc::Sender<DeviceReply>,
        signal: Arc<CompletionSignal>,
        running: Arc<AtomicBool>,
    ) {
        while running.load(Ordering::Relaxed) {
            tokio::select! {
                command = receiver.recv() => {
                    match command {
                        Some(DeviceCommand::Call { call_id, envelope }) => {
                            debug!("Device {} executing {} (call {})", device, envelope.target(), call_id);
                            let outcome = fleet.execute(&envelope).await.map_err(|e| {
                                error!("Device {} failed on {}: {:#}", device, envelope.target(), e);
                                Self::reply_error(device, e)
                            });
                            if replies.send(DeviceReply { call_id, outcome }).await.is_err() {
                                warn!("Device {} reply channel closed", device);
                                break;
                            }
                            signal.set();
                        }
                        Some(DeviceCommand::Shutdown) => {
                            info!("Device worker {} received shutdown", device);
                            break;
                        }
                        None => {
                            info!("Device worker {} command channel closed", device);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(100)) => {

                }
            }
        }

        info!("Device worker {} shutting down with {} model(s) loaded", device, fleet.loaded_count());
    }

    /// Typed errors cross the channel unchanged; anything else becomes `Worker`.
    fn reply_error(device: usize, err: anyhow::Error) -> FleetError {
        match FleetError::from_anyhow(err) {
            FleetError::Other(other) => FleetError::Worker {
                device,
                message: format!("{:#}", other),
            },
            typed => typed,
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Block until the worker thread exits. Returns false if it panicked.
    pub fn join(&mut self) -> bool {
        match self.thread_handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
