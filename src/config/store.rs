//! Durable YAML-backed config store.
//!
//! Every call re-reads (or rewrites) the file directly — no in-memory cache,
//! matching `GetAutoScalingConfig`/`SaveAutoScalingConfig` in
//! `examples/original_source/autoscaling/autoscaling.go`, which hit the file
//! on every call rather than caching it. This is a deliberate departure from
//! the teacher's `ConfigLoader` (which watches the file and caches behind an
//! `ArcSwap`): spec.md §4.C has no hot-reload notion, so that machinery has
//! no counterpart here.

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the config file. Missing file → `ConfigMissing`. Malformed YAML
    /// → `ConfigInvalid`. An empty document deserializes to an empty list,
    /// which is success (spec.md §4.C).
    pub fn load(&self) -> Result<RegistryConfig> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigMissing(self.path.display().to_string())
            } else {
                Error::ConfigInvalid(format!("reading {}: {e}", self.path.display()))
            }
        })?;

        if content.trim().is_empty() {
            return Ok(RegistryConfig::default());
        }

        serde_yaml::from_str(&content)
            .map_err(|e| Error::ConfigInvalid(format!("parsing {}: {e}", self.path.display())))
    }

    /// Serialize and atomically replace the config file: write to a sibling
    /// temp file, then rename over the original so readers never observe a
    /// partially written document.
    pub fn save(&self, config: &RegistryConfig) -> Result<()> {
        let serialized = serde_yaml::to_string(config)
            .map_err(|e| Error::ConfigInvalid(format!("serializing config: {e}")))?;

        let tmp_path = tmp_sibling(&self.path);
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "config.yaml.tmp".to_string());
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalingGroupConfig;

    #[test]
    fn missing_file_is_config_missing() {
        let store = ConfigStore::new("/nonexistent/path/to/config.yaml");
        match store.load() {
            Err(Error::ConfigMissing(_)) => {},
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();
        let store = ConfigStore::new(path);
        let config = store.load().unwrap();
        assert!(config.autoscalings.is_empty());
    }

    #[test]
    fn malformed_yaml_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "autoscalings: [not: valid: yaml:").unwrap();
        let store = ConfigStore::new(path);
        match store.load() {
            Err(Error::ConfigInvalid(_)) => {},
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ConfigStore::new(path);

        let config = RegistryConfig {
            autoscalings: vec![ScalingGroupConfig {
                autoscaling_group_name: "dummy-prod-ag".to_string(),
                autoscaling_count: 10,
                host_prefix: "dummy-prod-app".to_string(),
            }],
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }
}
