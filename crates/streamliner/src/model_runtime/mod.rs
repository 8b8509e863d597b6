//! Model runtime
//!
//! The collaborators the fleet builds models through: the `Model` and
//! `ModelBuilder` traits, the class registry, the model catalog and the stock
//! local/remote builders.
//!
//! Architecture:
//! - Workers receive a `BuilderConfig` and construct their own builder via the registry
//! - Builders look models up in the catalog and construct them by class name
//! - The remote builder fetches missing artifacts before the local build step
pub mod model_trait;
pub mod catalog;
pub mod registry;
pub mod local_builder;
pub mod remote_builder;
pub mod echo_model;
#[cfg(test)]
pub(crate) mod test_support;
pub use model_trait::{BuilderConfig, BuilderKind, Model, ModelBuilder};
pub use catalog::{load_catalog, parse_catalog, ModelCatalog, ModelSpec};
pub use registry::Registry;
pub use local_builder::LocalBuilder;
pub use remote_builder::RemoteBuilder;
pub use echo_model::EchoModel;
