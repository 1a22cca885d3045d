pub mod scan_types;

use serde::Deserialize;

use crate::lib::dispatch::entry::DEFAULT_MAX_DESIRED_COUNT;
use crate::lib::launch::{docker::LocalSettings, ecs::CloudSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Cloud,
    Local,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Which launch backend to build at startup
    #[serde(default = "default_mode")]
    pub dispatch_mode: DispatchMode,

    pub fargate_cluster_name: Option<String>,
    pub fargate_task_definition_name: Option<String>,
    pub fargate_sg_id: Option<String>,
    pub fargate_subnet_id: Option<String>,

    #[serde(default = "default_platform_version")]
    pub fargate_platform_version: String,

    /// Worker image for local containers
    #[serde(default = "default_local_image")]
    pub local_image: String,

    /// Docker network the local workers join
    #[serde(default = "default_local_network")]
    pub local_network: String,

    #[serde(default = "default_local_memory")]
    pub local_memory_bytes: i64,

    #[serde(default)]
    pub local_pull_image: bool,

    /// Optional JSON file overriding the built-in scan type registry
    pub scan_types_path: Option<String>,

    /// Environment variables forwarded to local workers
    #[serde(default)]
    pub worker_secret_names: Vec<String>,

    /// Largest desiredCount a dispatch request may ask for
    #[serde(default = "default_max_desired_count")]
    pub max_desired_count: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_mode() -> DispatchMode {
    DispatchMode::Cloud
}

fn default_platform_version() -> String {
    "1.4.0".to_string()
}

fn default_local_image() -> String {
    "crossfeed-worker".to_string()
}

fn default_local_network() -> String {
    "crossfeed_backend".to_string()
}

fn default_local_memory() -> i64 {
    4_000_000_000
}

fn default_max_desired_count() -> usize {
    DEFAULT_MAX_DESIRED_COUNT
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Failed to read scan type registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scan type registry: {0}")]
    Registry(#[from] serde_json::Error),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    pub fn cloud_settings(&self) -> Result<CloudSettings, ConfigError> {
        fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        }

        Ok(CloudSettings {
            cluster: required(&self.fargate_cluster_name, "FARGATE_CLUSTER_NAME")?,
            task_definition: required(
                &self.fargate_task_definition_name,
                "FARGATE_TASK_DEFINITION_NAME",
            )?,
            security_group: required(&self.fargate_sg_id, "FARGATE_SG_ID")?,
            subnet: required(&self.fargate_subnet_id, "FARGATE_SUBNET_ID")?,
            platform_version: self.fargate_platform_version.clone(),
        })
    }

    pub fn local_settings(&self) -> LocalSettings {
        LocalSettings {
            image: self.local_image.clone(),
            network: self.local_network.clone(),
            memory: self.local_memory_bytes,
            pull_image: self.local_pull_image,
            name_prefix: "crossfeed_worker".to_string(),
        }
    }
}
