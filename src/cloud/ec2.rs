//! Real `CloudClient`, backed by the AWS Auto Scaling and EC2 APIs.
//!
//! Grounded on `describeAutoScalingInstances` in
//! `examples/original_source/autoscaling/autoscaling.go`: look up the named
//! Auto Scaling group, keep only its `InService` instances, then resolve
//! each instance id to a private IPv4 via EC2.

use crate::cloud::{CloudClient, LiveInstance, LocalMetadata};
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_sdk_autoscaling::types::LifecycleState;
use reqwest::Client;

const IMDS_BASE: &str = "http://169.254.169.254/latest/meta-data";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/latest/api/token";
const IMDS_GROUP_TAG: &str = "autoscaling:group";

pub struct Ec2CloudClient {
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
    http: Client,
}

impl Ec2CloudClient {
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        Self {
            autoscaling: aws_sdk_autoscaling::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
            http: Client::new(),
        }
    }

    async fn imds_token(&self) -> Result<String> {
        self.http
            .put(IMDS_TOKEN_URL)
            .header("X-aws-ec2-metadata-token-ttl-seconds", "60")
            .send()
            .await
            .map_err(|e| Error::CloudError(format!("imds token request: {e}")))?
            .text()
            .await
            .map_err(|e| Error::CloudError(format!("imds token body: {e}")))
    }

    async fn imds_get(&self, token: &str, path: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!("{IMDS_BASE}/{path}"))
            .header("X-aws-ec2-metadata-token", token)
            .send()
            .await
            .map_err(|e| Error::CloudError(format!("imds GET {path}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::CloudError(format!("imds GET {path}: status {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| Error::CloudError(format!("imds GET {path} body: {e}")))
    }
}

#[async_trait]
impl CloudClient for Ec2CloudClient {
    async fn list_instances(&self, group: &str) -> Result<Vec<LiveInstance>> {
        let resp = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group)
            .send()
            .await
            .map_err(|e| Error::CloudError(format!("DescribeAutoScalingGroups: {e}")))?;

        let group = resp
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| Error::CloudError(format!("auto scaling group not found: {group}")))?;

        let in_service_ids: Vec<String> = group
            .instances()
            .iter()
            .filter(|i| i.lifecycle_state() == Some(&LifecycleState::InService))
            .filter_map(|i| i.instance_id().map(str::to_string))
            .collect();

        if in_service_ids.is_empty() {
            return Ok(Vec::new());
        }

        let desc = self
            .ec2
            .describe_instances()
            .set_instance_ids(Some(in_service_ids))
            .send()
            .await
            .map_err(|e| Error::CloudError(format!("DescribeInstances: {e}")))?;

        let mut live = Vec::new();
        for reservation in desc.reservations() {
            for instance in reservation.instances() {
                let (Some(id), Some(ip)) = (instance.instance_id(), instance.private_ip_address())
                else {
                    continue;
                };
                live.push(LiveInstance { instance_id: id.to_string(), ip: ip.to_string() });
            }
        }
        Ok(live)
    }

    async fn local_instance_metadata(&self) -> Result<LocalMetadata> {
        let token = self.imds_token().await?;
        let instance_id = self.imds_get(&token, "instance-id").await?;
        let ip = self.imds_get(&token, "local-ipv4").await?;
        let tags = self
            .imds_get(&token, &format!("tags/instance/{IMDS_GROUP_TAG}"))
            .await
            .unwrap_or_default();
        if tags.is_empty() {
            return Err(Error::CloudError(
                "instance has no autoscaling:group tag in IMDS".into(),
            ));
        }
        Ok(LocalMetadata { instance_id, ip, group: tags })
    }
}
