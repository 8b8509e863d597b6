pub mod config;
pub mod envelope;
pub mod error;
pub mod fleet;
pub mod metrics;
pub mod model_runtime;
pub mod proxy;
pub mod telemetry;
#[cfg(feature = "cli")]
pub mod server;

// Public API exports
pub use config::FleetConfig;
pub use envelope::{CallEnvelope, CallResponse};
pub use error::{FleetError, FleetResult};
pub use fleet::{FleetOptions, InProcessExecutor, LoadBalancer, MultiDeviceFleet, SingleDeviceFleet};
pub use model_runtime::{BuilderConfig, BuilderKind, Model, ModelBuilder, Registry};
pub use proxy::{CallExecutor, MethodProxy, ModelProxy, RemoteExecutor};
#[cfg(feature = "cli")]
pub use server::run_fleet_server;
