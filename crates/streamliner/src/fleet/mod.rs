//! Fleet layer
//!
//! - `single_device`: per-worker model cache (build on first access)
//! - `device_worker`: one dedicated thread per device serving its channel
//! - `load_balancer`: device selection, per-device locking, build coordination
//! - `multi_device`: starts and stops the workers, exposes the dispatch callable
pub mod signal;
pub mod readiness;
pub mod single_device;
pub mod device_worker;
pub mod load_balancer;
pub mod multi_device;
pub use signal::CompletionSignal;
pub use readiness::{BuildClaim, Readiness, ReadinessMap};
pub use single_device::{InProcessExecutor, SingleDeviceFleet};
pub use device_worker::{DeviceChannel, DeviceCommand, DeviceReply, DeviceWorker};
pub use load_balancer::{DeviceSlot, LoadBalancer};
pub use multi_device::{FleetOptions, MultiDeviceFleet};
