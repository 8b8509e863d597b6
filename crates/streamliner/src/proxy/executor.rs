use crate::envelope::CallEnvelope;
use crate::error::FleetError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Anything that can run a call envelope: the fleet's load balancer, an
/// in-process single-device cache or a remote HTTP endpoint.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError>;
}

#[async_trait]
impl<T: CallExecutor + ?Sized> CallExecutor for Arc<T> {
    async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        (**self).execute(envelope).await
    }
}
