//! Fleet metrics
//!
//! Recording helpers are no-ops until `init_metrics` has run, so library users
//! who never expose `/metrics` pay nothing.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Registry, TextEncoder};
use parking_lot::Mutex;
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    static ref INIT_LOCK: Mutex<()> = Mutex::new(());
}

static DISPATCH_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static INFLIGHT_CALLS: OnceLock<IntGauge> = OnceLock::new();
static LOCK_WAIT_TIME: OnceLock<Histogram> = OnceLock::new();
static BUILD_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() -> prometheus::Result<()> {
    let _init = INIT_LOCK.lock();
    if DISPATCH_COUNTER.get().is_some() {
        return Ok(());
    }

    let dispatch_counter = IntCounterVec::new(
        prometheus::opts!("fleet_dispatch_total", "Calls dispatched per device"),
        &["device", "status"],
    )?;
    let inflight_calls = IntGauge::new("fleet_inflight_calls", "Calls currently holding a device")?;
    let lock_wait_time = Histogram::with_opts(HistogramOpts::new(
        "fleet_lock_wait_seconds",
        "Time spent waiting for a device lock",
    ))?;
    let build_counter = IntCounterVec::new(
        prometheus::opts!("fleet_builds_total", "Model instances constructed"),
        &["model"],
    )?;

    REGISTRY.register(Box::new(dispatch_counter.clone())).ok();
    REGISTRY.register(Box::new(inflight_calls.clone())).ok();
    REGISTRY.register(Box::new(lock_wait_time.clone())).ok();
    REGISTRY.register(Box::new(build_counter.clone())).ok();

    let _ = DISPATCH_COUNTER.set(dispatch_counter);
    let _ = INFLIGHT_CALLS.set(inflight_calls);
    let _ = LOCK_WAIT_TIME.set(lock_wait_time);
    let _ = BUILD_COUNTER.set(build_counter);
    Ok(())
}

pub fn inc_dispatch(device: usize, status: &str) {
    if let Some(counter) = DISPATCH_COUNTER.get() {
        counter.with_label_values(&[&device.to_string(), status]).inc();
    }
}

pub fn inc_inflight() {
    if let Some(gauge) = INFLIGHT_CALLS.get() {
        gauge.inc();
    }
}

pub fn dec_inflight() {
    if let Some(gauge) = INFLIGHT_CALLS.get() {
        gauge.dec();
    }
}

pub fn observe_lock_wait(seconds: f64) {
    if let Some(histogram) = LOCK_WAIT_TIME.get() {
        histogram.observe(seconds);
    }
}

pub fn inc_build(model_name: &str) {
    if let Some(counter) = BUILD_COUNTER.get() {
        counter.with_label_values(&[model_name]).inc();
    }
}

/// Prometheus text exposition of everything registered.
pub fn gather_text() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        inc_dispatch(3, "ok");
        inc_build("clip");
        inc_inflight();
        dec_inflight();
        observe_lock_wait(0.01);

        let text = gather_text().unwrap();
        assert!(text.contains("fleet_dispatch_total"));
        assert!(text.contains("device=\"3\""));
        assert!(text.contains("fleet_builds_total{model=\"clip\"}"));
        assert!(text.contains("fleet_lock_wait_seconds"));
    }
}
