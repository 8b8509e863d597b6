//! HTTP executor
//!
//! Posts the envelope JSON to a fleet endpoint (`POST /fleet_server` on a
//! `streamliner` server) and unwraps `{"result": ...}`.

use super::executor::CallExecutor;
use crate::envelope::{CallEnvelope, CallResponse};
use crate::error::FleetError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RemoteExecutor {
    url: String,
    http_client: reqwest::Client,
}

impl RemoteExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(600))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CallExecutor for RemoteExecutor {
    async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
        debug!("Posting {} to {}", envelope.target(), self.url);
        let resp = self.http_client.post(&self.url).json(&envelope).send().await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            warn!("Remote fleet returned {} for {}", status, envelope.target());
            return Err(FleetError::Remote { status: status.as_u16(), body });
        }

        let response: CallResponse = resp.json().await?;
        Ok(response.result)
    }
}
