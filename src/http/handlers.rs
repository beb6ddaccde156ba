//! One thin handler per endpoint in spec.md §6's table: parse/validate the
//! request, delegate to the `AliasRegistry`, translate the outcome to the
//! `{status, message, ...}` envelope and status code from spec.md §4.E.

use crate::error::{Error, Result};
use crate::health;
use crate::http::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// GET /autoscaling — list all groups and their slot tables.
pub async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let config = state.config_store.load()?;
    let mut groups = Vec::new();
    for group_cfg in &config.autoscalings {
        let listing = state.registry.list_group(group_cfg)?;
        groups.push(json!({
            "group": listing.group,
            "slots": listing.slots.iter().map(|s| json!({
                "alias": s.alias,
                "instanceId": s.data.instance_id,
                "ip": s.data.ip,
            })).collect::<Vec<_>>(),
        }));
    }
    Ok(Json(json!({"status": "OK", "message": "", "groups": groups})))
}

/// GET /autoscaling/resolve/{alias} — alias → IP.
pub async fn resolve_alias(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<impl IntoResponse> {
    let ip = state.registry.resolve_alias(&alias)?;
    Ok(Json(json!({"status": "OK", "message": "", "ip": ip})))
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    port: Option<u16>,
}

/// GET /autoscaling/health/{alias}?port=N — probe the alias's bound
/// instance. Never surfaces as an HTTP error: an unreachable instance is
/// reported as `status: "NG"` in a 200 response, matching spec.md §4.E's
/// description of this endpoint as a reachability report, not a precondition
/// check.
pub async fn health(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(params): Query<HealthQuery>,
) -> impl IntoResponse {
    let ip = match state.registry.resolve_alias(&alias) {
        Ok(ip) => ip,
        Err(e) => return e.into_response(),
    };

    match health::probe(&ip, params.port).await {
        health::ProbeOutcome::NotAssigned => {
            (StatusCode::OK, Json(json!({"status": "OK", "message": "not assigned"}))).into_response()
        },
        health::ProbeOutcome::Reachable => {
            (StatusCode::OK, Json(json!({"status": "OK", "message": "reachable"}))).into_response()
        },
        health::ProbeOutcome::Unreachable { reason } => {
            (StatusCode::OK, Json(json!({"status": "NG", "message": reason}))).into_response()
        },
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    group: String,
}

/// POST /autoscaling/refresh {group} (empty = all) — reconcile slots.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse> {
    let config = state.config_store.load()?;

    let targets: Vec<_> = if req.group.is_empty() {
        config.autoscalings.clone()
    } else {
        vec![config
            .find(&req.group)
            .cloned()
            .ok_or_else(|| Error::UnknownGroup(req.group.clone()))?]
    };

    for group_cfg in &targets {
        state.registry.refresh(state.cloud.as_ref(), group_cfg).await?;
    }

    Ok(Json(json!({"status": "OK", "message": format!("refreshed {} group(s)", targets.len())})))
}

#[derive(Debug, Deserialize)]
pub struct DeleteGroupRequest {
    group: String,
}

/// POST /autoscaling/delete {group} — remove group data.
pub async fn delete_group(
    State(state): State<AppState>,
    Json(req): Json<DeleteGroupRequest>,
) -> Result<impl IntoResponse> {
    if req.group.is_empty() {
        return Err(Error::MissingParameter("group"));
    }
    state.registry.delete_group(&req.group)?;
    Ok(Json(json!({"status": "OK", "message": format!("deleted group {}", req.group)})))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    group: String,
    #[serde(rename = "instanceId")]
    instance_id: String,
    ip: String,
}

/// POST /autoscaling/instance/register {group, instanceId, ip} — instance
/// join.
pub async fn register_instance(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    if req.group.is_empty() {
        return Err(Error::MissingGroupName);
    }
    if req.instance_id.is_empty() {
        return Err(Error::MissingParameter("instanceId"));
    }
    if req.ip.is_empty() {
        return Err(Error::MissingParameter("ip"));
    }

    let config = state.config_store.load()?;
    let group_cfg = config.find(&req.group).ok_or_else(|| Error::UnknownGroup(req.group.clone()))?;

    let (alias, data) = state.registry.register(group_cfg, &req.instance_id, &req.ip)?;

    Ok(Json(json!({
        "status": "OK",
        "message": "registered",
        "alias": alias,
        "metricConfig": data.metric_config,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeregisterRequest {
    #[serde(rename = "instanceId")]
    instance_id: String,
}

/// POST /autoscaling/instance/deregister {instanceId} — instance leave.
///
/// spec.md §6 also lists a `/autoscaling/leave` endpoint, but that one is
/// node-side: the node discovers its own instance id and calls out to
/// *its configured bastion's* deregister endpoint (see [`crate::node::leave`]
/// and the `leave` CLI subcommand), rather than being a route the bastion
/// itself serves. There is no bastion-side `/autoscaling/leave` handler.
pub async fn deregister_instance(
    State(state): State<AppState>,
    Json(req): Json<DeregisterRequest>,
) -> Result<impl IntoResponse> {
    if req.instance_id.is_empty() {
        return Err(Error::MissingParameter("instanceId"));
    }
    state.registry.deregister(&req.instance_id)?;
    Ok(Json(json!({"status": "OK", "message": "deregistered"})))
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    config: crate::config::RegistryConfig,
}

/// POST /autoscaling/config/update {config} — replace the config file.
pub async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> Result<impl IntoResponse> {
    req.config.validate()?;
    state.config_store.save(&req.config)?;
    Ok(Json(json!({"status": "OK", "message": "config updated"})))
}

/// GET /status/autoscaling — drift report per configured group.
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let config = state.config_store.load()?;
    let mut report = HashMap::new();
    for group_cfg in &config.autoscalings {
        let diff = state.registry.compare_instances(state.cloud.as_ref(), group_cfg).await?;
        let entry = if diff.is_empty() {
            "ok".to_string()
        } else {
            format!("error: {}", diff.join(","))
        };
        report.insert(group_cfg.autoscaling_group_name.clone(), entry);
    }
    Ok(Json(json!({"status": "OK", "message": "", "groups": report})))
}
