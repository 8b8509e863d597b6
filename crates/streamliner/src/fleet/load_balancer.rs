//! Device load balancer
//!
//! Picks a device for each call (round-robin over idle devices, plain
//! round-robin over all devices when every one is busy), holds the device's
//! lock for the duration of the call and releases it afterwards whatever the
//! outcome. When the builder is remote, the readiness map makes the first
//! caller for a model build it while later callers wait.

use super::device_worker::{DeviceChannel, DeviceCommand, DeviceReply};
use super::readiness::{Readiness, ReadinessMap};
use super::signal::CompletionSignal;
use crate::envelope::CallEnvelope;
use crate::error::FleetError;
use crate::metrics;
use crate::proxy::CallExecutor;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

/// A device index with its channel, lock and completion signal.
pub struct DeviceSlot {
    device: usize,
    commands: mpsc::Sender<DeviceCommand>,
    /// Holding this lock is exclusive use of the device's duplex channel.
    channel_lock: AsyncMutex<mpsc::Receiver<DeviceReply>>,
    signal: Arc<CompletionSignal>,
}

impl DeviceSlot {
    pub fn new(device: usize, channel: DeviceChannel, signal: Arc<CompletionSignal>) -> Self {
        Self {
            device,
            commands: channel.commands,
            channel_lock: AsyncMutex::new(channel.replies),
            signal,
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    async fn send_shutdown(&self) -> bool {
        self.commands.send(DeviceCommand::Shutdown).await.is_ok()
    }
}

struct SelectorState {
    cursor: usize,
    available: Vec<bool>,
}

pub struct LoadBalancer {
    slots: Vec<DeviceSlot>,
    selector: Mutex<SelectorState>,
    readiness: Option<Arc<ReadinessMap>>,
    dispatch_timeout: Option<Duration>,
    next_call_id: AtomicU64,
}

/// Marks the device available again when dropped.
struct AvailabilityLease<'a> {
    balancer: &'a LoadBalancer,
    position: usize,
}

impl Drop for AvailabilityLease<'_> {
    fn drop(&mut self) {
        self.balancer.mark_available(self.position);
        metrics::dec_inflight();
    }
}

/// Clears the completion signal when dropped; must drop before the lock guard.
struct SignalReset<'a>(&'a CompletionSignal);

impl Drop for SignalReset<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

impl LoadBalancer {
    pub fn new(
        slots: Vec<DeviceSlot>,
        readiness: Option<Arc<ReadinessMap>>,
        dispatch_timeout: Option<Duration>,
    ) -> Self {
        let available = vec![true; slots.len()];
        Self {
            slots,
            selector: Mutex::new(SelectorState { cursor: 0, available }),
            readiness,
            dispatch_timeout,
            next_call_id: AtomicU64::new(0),
        }
    }

    pub fn device_indices(&self) -> Vec<usize> {
        self.slots.iter().map(DeviceSlot::device).collect()
    }

    pub fn readiness(&self) -> Option<&Arc<ReadinessMap>> {
        self.readiness.as_ref()
    }

    /// Choose a slot position and mark it unavailable, under one critical section.
    fn select_device(&self) -> usize {
        let mut state = self.selector.lock();
        let available: Vec<usize> = state
            .available
            .iter()
            .enumerate()
            .filter_map(|(position, free)| free.then_some(position))
            .collect();
        let selected = if available.is_empty() {
            state.cursor % self.slots.len()
        } else {
            available[state.cursor % available.len()]
        };
        state.cursor = state.cursor.wrapping_add(1);
        state.available[selected] = false;
        selected
    }

    fn mark_available(&self, position: usize) {
        self.selector.lock().available[position] = true;
    }

    /// Route one call to a device and return the worker's result.
    pub async fn dispatch(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        if self.slots.is_empty() {
            return Err(FleetError::Config("fleet has no devices".to_string()));
        }

        let claim = match &self.readiness {
            Some(readiness) => match readiness.ensure_ready(&envelope.model_name).await {
                Readiness::Claimed(claim) => Some(claim),
                Readiness::Ready => None,
            },
            None => None,
        };

        let position = self.select_device();
        metrics::inc_inflight();
        let _lease = AvailabilityLease { balancer: self, position };
        let slot = &self.slots[position];
        let device = slot.device;
        debug!("Routing {} to device {}", envelope.target(), device);

        let result = match self.dispatch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run_on_device(slot, envelope))
                .await
                .unwrap_or_else(|_| {
                    warn!("Call on device {} timed out after {:?}", device, timeout);
                    Err(FleetError::Timeout { device, timeout })
                }),
            None => self.run_on_device(slot, envelope).await,
        };
        metrics::inc_dispatch(device, if result.is_ok() { "ok" } else { "error" });

        let value = result?;
        if let Some(claim) = claim {
            debug!("Model {} is now ready fleet-wide", claim.model_name());
            claim.complete();
        }
        Ok(value)
    }

    /// Lock the device, send the call and wait for its reply. The dispatch
    /// timeout covers this whole section; dropping it early releases the lock
    /// and clears the signal.
    async fn run_on_device(&self, slot: &DeviceSlot, envelope: CallEnvelope) -> Result<Value, FleetError> {
        let wait_started = Instant::now();
        let mut replies = slot.channel_lock.lock().await;
        metrics::observe_lock_wait(wait_started.elapsed().as_secs_f64());
        let _reset = SignalReset(&slot.signal);

        // Replies left behind by timed-out calls would otherwise block the worker.
        while let Ok(stale) = replies.try_recv() {
            warn!("Discarding late reply for call {} on device {}", stale.call_id, slot.device);
        }

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        slot.commands
            .send(DeviceCommand::Call { call_id, envelope })
            .await
            .map_err(|_| FleetError::WorkerExited(slot.device))?;

        Self::await_reply(slot, &mut replies, call_id).await?.outcome
    }

    async fn await_reply(
        slot: &DeviceSlot,
        replies: &mut mpsc::Receiver<DeviceReply>,
        call_id: u64,
    ) -> Result<DeviceReply, FleetError> {
        slot.signal.wait().await;
        loop {
            match replies.recv().await {
                Some(reply) if reply.call_id == call_id => return Ok(reply),
                Some(stale) => {
                    warn!("Discarding late reply for call {} on device {}", stale.call_id, slot.device)
                }
                None => return Err(FleetError::WorkerExited(slot.device)),
            }
        }
    }

    /// Send the shutdown sentinel to every device. Returns how many workers
    /// were still listening.
    pub async fn shutdown_all(&self) -> usize {
        let mut delivered = 0;
        for slot in &self.slots {
            if slot.send_shutdown().await {
                delivered += 1;
            } else {
                debug!("Device {} already stopped", slot.device);
            }
        }
        delivered
    }
}

#[async_trait]
impl CallExecutor for LoadBalancer {
    async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        self.dispatch(envelope).await
    }
}
