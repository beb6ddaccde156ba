//! Registry config validation logic.

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use std::collections::HashSet;

impl RegistryConfig {
    /// Validate that scaling group declarations are well-formed and
    /// unambiguous. The config file is the source of truth for slot counts
    /// and host prefixes (spec.md §4.C): the registry never invents any of
    /// this, so bad input here must be rejected before it reaches the KV
    /// layer.
    pub fn validate(&self) -> Result<()> {
        let mut seen_names = HashSet::new();

        for group in &self.autoscalings {
            if group.autoscaling_group_name.is_empty() {
                return Err(Error::ConfigInvalid(
                    "autoscaling_group_name cannot be empty".to_string(),
                ));
            }
            if !seen_names.insert(group.autoscaling_group_name.as_str()) {
                return Err(Error::ConfigInvalid(format!(
                    "duplicate autoscaling_group_name: {}",
                    group.autoscaling_group_name
                )));
            }
            if group.autoscaling_count == 0 {
                return Err(Error::ConfigInvalid(format!(
                    "group {} has autoscaling_count of zero",
                    group.autoscaling_group_name
                )));
            }
            if group.host_prefix.is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "group {} has empty host_prefix",
                    group.autoscaling_group_name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalingGroupConfig;

    fn group(name: &str, count: u32, prefix: &str) -> ScalingGroupConfig {
        ScalingGroupConfig {
            autoscaling_group_name: name.to_string(),
            autoscaling_count: count,
            host_prefix: prefix.to_string(),
        }
    }

    #[test]
    fn empty_config_is_valid() {
        assert!(RegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_slot_count() {
        let config = RegistryConfig { autoscalings: vec![group("g", 0, "app")] };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_group_names() {
        let config = RegistryConfig {
            autoscalings: vec![group("g", 1, "app"), group("g", 2, "other")],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_host_prefix() {
        let config = RegistryConfig { autoscalings: vec![group("g", 1, "")] };
        assert!(config.validate().is_err());
    }
}
