//! Instance-side join/leave flow (spec.md §4.F), grounded on
//! `autoscaling.JoinAutoScalingGroup` and the daemon's `enable-autoscaling-node`
//! start-up goroutine in `examples/original_source/command/daemon.go`: sleep
//! `joinWaitSeconds`, discover local metadata, POST to the bastion, persist
//! the returned metric config.

use crate::cloud::CloudClient;
use crate::config::NodeSettings;
use crate::error::{Error, Result};
use crate::registry::model::MetricConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    group: &'a str,
    #[serde(rename = "instanceId")]
    instance_id: &'a str,
    ip: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    status: String,
    message: String,
    #[serde(default, rename = "metricConfig")]
    metric_config: Option<MetricConfig>,
}

#[derive(Debug, Serialize)]
struct DeregisterBody<'a> {
    #[serde(rename = "instanceId")]
    instance_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeregisterResponse {
    status: String,
    message: String,
}

/// Run the one-shot join flow: wait `joinWaitSeconds`, discover local cloud
/// metadata, register with the bastion, and persist the returned metric
/// config to disk so the (out-of-scope) monitoring loop picks it up.
///
/// Any failure aborts the join; it is logged but not retried, per spec.md
/// §4.F — the bastion's own periodic refresh will eventually reconcile a
/// node that never managed to join on its own.
pub async fn join(cloud: &dyn CloudClient, settings: &NodeSettings) -> Result<()> {
    tokio::time::sleep(std::time::Duration::from_secs(settings.join_wait_seconds)).await;

    let metadata = match cloud.local_instance_metadata().await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to discover local instance metadata, aborting join");
            return Err(e);
        },
    };

    let client = reqwest::Client::new();
    let url = format!("{}/autoscaling/instance/register", settings.bastion_url.trim_end_matches('/'));
    let body = RegisterBody { group: &metadata.group, instance_id: &metadata.instance_id, ip: &metadata.ip };

    let resp = client.post(&url).json(&body).send().await.map_err(|e| {
        error!(error = %e, "join request failed");
        Error::CloudError(format!("join request to {url}: {e}"))
    })?;

    if !resp.status().is_success() {
        let status = resp.status();
        error!(%status, "bastion rejected join");
        return Err(Error::CloudError(format!("bastion rejected join: HTTP {status}")));
    }

    let parsed: RegisterResponse = resp
        .json()
        .await
        .map_err(|e| Error::CloudError(format!("parsing join response: {e}")))?;

    if parsed.status != "OK" {
        error!(message = %parsed.message, "join rejected by bastion");
        return Err(Error::CloudError(parsed.message));
    }

    if let Some(metric_config) = parsed.metric_config {
        let serialized = serde_yaml::to_string(&metric_config)
            .map_err(|e| Error::ConfigInvalid(format!("serializing metric config: {e}")))?;
        std::fs::write(&settings.metric_config_path, serialized)?;
    } else {
        warn!("bastion returned no metric config on join");
    }

    info!(instance_id = %metadata.instance_id, group = %metadata.group, "join succeeded");
    Ok(())
}

/// POST `{instanceId}` to the bastion's `deregister` endpoint. Errors are
/// reported but not retried by the core (spec.md §4.F).
pub async fn leave(bastion_url: &str, instance_id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/autoscaling/instance/deregister", bastion_url.trim_end_matches('/'));
    let body = DeregisterBody { instance_id };

    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::CloudError(format!("leave request to {url}: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        warn!(%status, "bastion rejected leave");
        return Err(Error::CloudError(format!("bastion rejected leave: HTTP {status}")));
    }

    let parsed: DeregisterResponse = resp
        .json()
        .await
        .map_err(|e| Error::CloudError(format!("parsing leave response: {e}")))?;

    if parsed.status != "OK" {
        warn!(message = %parsed.message, "leave rejected by bastion");
        return Err(Error::CloudError(parsed.message));
    }

    info!(instance_id, "leave succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{FakeCloudClient, LocalMetadata};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn join_persists_metric_config_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/autoscaling/instance/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "message": "registered",
                "metricConfig": {"metrics": [{"name": "cpu", "hostname": "g-app-01"}]},
            })))
            .mount(&server)
            .await;

        let cloud = FakeCloudClient::new();
        cloud.set_local_metadata(LocalMetadata {
            instance_id: "i-aaaaaa".into(),
            ip: "192.0.2.5".into(),
            group: "g".into(),
        });

        let dir = tempfile::tempdir().unwrap();
        let metric_config_path = dir.path().join("metrics.yaml");
        let settings = NodeSettings {
            bastion_url: server.uri(),
            join_wait_seconds: 0,
            metric_config_path: metric_config_path.clone(),
        };

        join(&cloud, &settings).await.unwrap();

        let written = std::fs::read_to_string(&metric_config_path).unwrap();
        assert!(written.contains("cpu"));
    }

    #[tokio::test]
    async fn join_aborts_when_metadata_lookup_fails() {
        let cloud = FakeCloudClient::new();
        let dir = tempfile::tempdir().unwrap();
        let settings = NodeSettings {
            bastion_url: "http://127.0.0.1:1".into(),
            join_wait_seconds: 0,
            metric_config_path: dir.path().join("metrics.yaml"),
        };
        assert!(join(&cloud, &settings).await.is_err());
    }

    #[tokio::test]
    async fn leave_reports_bastion_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/autoscaling/instance/deregister"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "message": "instance is not registered",
            })))
            .mount(&server)
            .await;

        let err = leave(&server.uri(), "i-unknown").await.unwrap_err();
        assert!(matches!(err, Error::CloudError(_)));
    }
}
