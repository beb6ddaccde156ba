//! In-memory `CloudClient` test double.
//!
//! `DashMap`-backed, matching the concurrency primitive the teacher already
//! depends on elsewhere for shared mutable state without a coarse lock.

use crate::cloud::{CloudClient, LiveInstance, LocalMetadata};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct FakeCloudClient {
    groups: DashMap<String, Vec<LiveInstance>>,
    local: std::sync::RwLock<Option<LocalMetadata>>,
}

impl FakeCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the live instance list a subsequent `list_instances(group)` call
    /// will return.
    pub fn set_group(&self, group: impl Into<String>, instances: Vec<LiveInstance>) {
        self.groups.insert(group.into(), instances);
    }

    /// Set the metadata `local_instance_metadata` will return.
    pub fn set_local_metadata(&self, metadata: LocalMetadata) {
        *self.local.write().expect("lock poisoned") = Some(metadata);
    }
}

#[async_trait]
impl CloudClient for FakeCloudClient {
    async fn list_instances(&self, group: &str) -> Result<Vec<LiveInstance>> {
        Ok(self.groups.get(group).map(|v| v.clone()).unwrap_or_default())
    }

    async fn local_instance_metadata(&self) -> Result<LocalMetadata> {
        self.local
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| Error::CloudError("no local metadata configured".into()))
    }
}
