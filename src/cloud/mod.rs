//! Cloud provider capability seam (spec.md §9: "no concrete SDK types leak
//! into the registry").
//!
//! `AliasRegistry` and the node join client depend only on this trait, never
//! on `aws-sdk-*` directly, mirroring how the teacher's `transport` layer
//! keeps `HttpTransport`/`StdioTransport` behind a trait rather than letting
//! callers reach for a concrete client.

pub mod ec2;
pub mod fake;

use crate::error::Result;
use async_trait::async_trait;

pub use ec2::Ec2CloudClient;
pub use fake::FakeCloudClient;

/// One live instance as reported by the cloud control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInstance {
    pub instance_id: String,
    pub ip: String,
}

/// Metadata describing the instance a node agent is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMetadata {
    pub instance_id: String,
    pub ip: String,
    pub group: String,
}

#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Live instances currently belonging to `group`, in provider-reported
    /// order (the registry never relies on this order; see `4.D.1`).
    async fn list_instances(&self, group: &str) -> Result<Vec<LiveInstance>>;

    /// Metadata for the instance the caller is currently running on. Used
    /// only by the node join client, never by the bastion.
    async fn local_instance_metadata(&self) -> Result<LocalMetadata>;
}
