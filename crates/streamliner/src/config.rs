use anyhow::{Context, Result};
use serde_json::{json, Map};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

use crate::model_runtime::BuilderConfig;

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub device_indices: Vec<usize>,
    pub builder_class: String,
    pub model_config_path: String,
    pub artifact_dir: Option<String>,
    pub remote_artifact_url: Option<String>,
    pub dispatch_timeout_seconds: u64,
    pub api_host: String,
    pub api_port: u16,
}

impl FleetConfig {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_indices = parse_device_indices(
            &lookup("DEVICE_INDICES").unwrap_or_else(|| "0".into()),
        )?;

        let builder_class = lookup("BUILDER_CLASS").unwrap_or_else(|| "LocalBuilder".into());

        let model_config_path = lookup("MODEL_CONFIG_PATH")
            .context("MODEL_CONFIG_PATH environment variable not set. Please set it in your .env file")?;

        let artifact_dir = lookup("ARTIFACT_DIR").filter(|v| !v.trim().is_empty());
        let remote_artifact_url = lookup("REMOTE_ARTIFACT_URL").filter(|v| !v.trim().is_empty());
        if builder_class == "RemoteBuilder" && remote_artifact_url.is_none() {
            return Err(anyhow::anyhow!(
                "REMOTE_ARTIFACT_URL must be set when BUILDER_CLASS is RemoteBuilder"
            ));
        }

        let dispatch_timeout_seconds = lookup("DISPATCH_TIMEOUT_SECONDS")
            .unwrap_or_else(|| "0".into())
            .parse::<u64>()
            .context("DISPATCH_TIMEOUT_SECONDS must be a whole number of seconds")?;

        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".into());
        let api_port = lookup("API_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        Ok(Self {
            device_indices,
            builder_class,
            model_config_path,
            artifact_dir,
            remote_artifact_url,
            dispatch_timeout_seconds,
            api_host,
            api_port,
        })
    }

    /// The `BuilderConfig` every device worker constructs its builder from.
    pub fn builder_config(&self) -> BuilderConfig {
        let mut init_params = Map::new();
        init_params.insert("path_to_cfg".into(), json!(self.model_config_path));
        if let Some(dir) = &self.artifact_dir {
            init_params.insert("artifact_dir".into(), json!(dir));
        }
        if let Some(url) = &self.remote_artifact_url {
            init_params.insert("remote_url".into(), json!(url));
        }
        BuilderConfig::new(self.builder_class.clone(), init_params)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_seconds > 0).then(|| Duration::from_secs(self.dispatch_timeout_seconds))
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Devices: {:?}", self.device_indices);
        info!("- Builder: {}", self.builder_class);
        info!("- Model Config: {}", self.model_config_path);
        info!("- Artifact Dir: {}", self.artifact_dir.as_deref().unwrap_or("(next to model config)"));
        if let Some(url) = &self.remote_artifact_url {
            info!("- Remote Artifacts: {}", url);
        }
        match self.dispatch_timeout() {
            Some(timeout) => info!("- Dispatch Timeout: {}s", timeout.as_secs()),
            None => info!("- Dispatch Timeout: none"),
        }
        info!("- API: {}:{}", self.api_host, self.api_port);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

/// Parse a comma-separated list such as `0,1,3`.
fn parse_device_indices(raw: &str) -> Result<Vec<usize>> {
    let indices = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .with_context(|| format!("Invalid device index '{}' in DEVICE_INDICES", part))
        })
        .collect::<Result<Vec<_>>>()?;

    if indices.is_empty() {
        return Err(anyhow::anyhow!("DEVICE_INDICES must name at least one device"));
    }
    Ok(indices)
}
