//! Client-facing proxies and the executors they dispatch through.
pub mod executor;
pub mod model_proxy;
pub mod remote;
pub use executor::CallExecutor;
pub use model_proxy::{MethodProxy, ModelProxy};
pub use remote::RemoteExecutor;
