//! Registry configuration: the YAML-backed list of scaling-group
//! declarations (spec.md §4.C, §6) plus the bastion/node process settings
//! read from the CLI.

pub mod store;
pub mod validation;

pub use store::ConfigStore;

use serde::{Deserialize, Serialize};

/// One scaling-group declaration: `(groupName, slotCount, hostPrefix)`.
/// Unique by `autoscaling_group_name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScalingGroupConfig {
    pub autoscaling_group_name: String,
    pub autoscaling_count: u32,
    pub host_prefix: String,
}

/// Top-level shape of the YAML config file (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub autoscalings: Vec<ScalingGroupConfig>,
}

impl RegistryConfig {
    pub fn find(&self, group: &str) -> Option<&ScalingGroupConfig> {
        self.autoscalings
            .iter()
            .find(|g| g.autoscaling_group_name == group)
    }
}

/// Process-level settings for the bastion binary: listen address, KV store
/// path, config file path, and cloud region. These are CLI/env inputs
/// (`clap`), not part of the persisted YAML.
#[derive(Debug, Clone)]
pub struct BastionSettings {
    pub listen_addr: std::net::SocketAddr,
    pub store_path: std::path::PathBuf,
    pub config_path: std::path::PathBuf,
    pub cloud_region: Option<String>,
}

/// Process-level settings for a node agent joining a bastion.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub bastion_url: String,
    pub join_wait_seconds: u64,
    pub metric_config_path: std::path::PathBuf,
}
