//! `AutoScalingHealth(alias, port?)`: resolve the alias, then probe
//! reachability of the bound instance.
//!
//! Grounded on `perform_check` in the teacher's `HealthChecker`
//! (request-with-timeout, classify by `is_timeout`/`is_connect`), trimmed to
//! a single one-shot probe: no periodic ticker, no moving-average latency,
//! no failure-threshold state machine — spec.md §4.E calls this synchronously
//! from an HTTP handler, once per request.

use std::time::{Duration, Instant};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The alias has no bound instance; nothing to probe.
    NotAssigned,
    /// The bound instance answered within the timeout.
    Reachable,
    /// The bound instance did not answer: timeout, refused connection, or
    /// non-success status.
    Unreachable { reason: String },
}

/// Probe `https://{ip}:{port}/` with a short timeout. TLS verification is
/// disabled, as this traverses only the private fleet network between the
/// bastion and its own instances, never the public internet.
pub async fn probe(ip: &str, port: Option<u16>) -> ProbeOutcome {
    if ip.is_empty() {
        return ProbeOutcome::NotAssigned;
    }

    let port = port.unwrap_or(DEFAULT_PORT);
    let url = format!("https://{ip}:{port}/");

    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(DEFAULT_PROBE_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => return ProbeOutcome::Unreachable { reason: format!("building probe client: {e}") },
    };

    let start = Instant::now();
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => ProbeOutcome::Reachable,
        Ok(resp) => ProbeOutcome::Unreachable { reason: format!("HTTP {}", resp.status()) },
        Err(e) => {
            let reason = if e.is_timeout() {
                format!("timeout after {:?}", start.elapsed())
            } else if e.is_connect() {
                "connection refused".to_string()
            } else {
                e.to_string()
            };
            ProbeOutcome::Unreachable { reason }
        },
    }
}
