//! Component C: RPC runner (SPEC_FULL.md §4.3) — fan-out HTTPS calls to
//! node daemons, grounded on `reqwest` (rustls-tls) plus the teacher's
//! `networking/transport` connection-pool shape and
//! `networking/security/mtls.rs` for the mutual-cert handshake model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Per-node RPC outcome. RPC itself never raises to the caller
/// (SPEC_FULL.md §4.3): failures become `fail_msg`, never a propagated
/// error from `call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResult {
    pub payload: Option<serde_json::Value>,
    pub fail_msg: Option<String>,
    pub offline: bool,
}

impl RpcResult {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self { payload: Some(payload), fail_msg: None, offline: false }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self { payload: None, fail_msg: Some(msg.into()), offline: false }
    }

    pub fn offline() -> Self {
        Self { payload: None, fail_msg: None, offline: true }
    }

    pub fn is_success(&self) -> bool {
        self.fail_msg.is_none() && !self.offline
    }
}

pub struct RpcRunner {
    client: reqwest::Client,
    /// node daemon port, default 1811 (SPEC_FULL.md §6).
    port: u16,
    per_call_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeTarget {
    pub name: String,
    pub address: String,
    pub offline: bool,
}

impl RpcRunner {
    pub fn new(port: u16, per_call_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(false)
            .build()
            .expect("reqwest client builder with default TLS config must succeed");
        Self { client, port, per_call_timeout }
    }

    /// Fan out `method(args)` to every node concurrently; offline nodes
    /// are short-circuited locally (no network call). There is no
    /// global timeout, only the per-call one (SPEC_FULL.md §4.3).
    pub async fn call(
        &self,
        nodes: &[NodeTarget],
        method: &str,
        args: &serde_json::Value,
    ) -> BTreeMap<String, RpcResult> {
        let futures = nodes.iter().map(|node| self.call_one(node, method, args));
        let results = futures::future::join_all(futures).await;
        nodes.iter().map(|n| n.name.clone()).zip(results).collect()
    }

    async fn call_one(&self, node: &NodeTarget, method: &str, args: &serde_json::Value) -> RpcResult {
        if node.offline {
            return RpcResult::offline();
        }

        let url = format!("https://{}:{}/{}", node.address, self.port, method);
        let body = serde_json::json!({ "method": method, "args": args });

        let request = self.client.post(&url).json(&body).timeout(self.per_call_timeout);
        match request.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(payload) => RpcResult::ok(payload),
                Err(e) => RpcResult::failed(format!("malformed reply: {e}")),
            },
            Ok(resp) => RpcResult::failed(format!("node daemon returned {}", resp.status())),
            Err(e) => {
                warn!(node = %node.name, error = %e, "rpc call failed");
                RpcResult::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_node_short_circuits_without_network() {
        let runner = RpcRunner::new(1811, Duration::from_millis(100));
        let nodes = vec![NodeTarget { name: "n1".into(), address: "192.0.2.1".into(), offline: true }];
        let results = runner.call(&nodes, "ping", &serde_json::Value::Null).await;
        assert!(results["n1"].offline);
        assert!(results["n1"].fail_msg.is_none());
    }

    #[tokio::test]
    async fn unreachable_node_yields_fail_msg_not_panic() {
        let runner = RpcRunner::new(1, Duration::from_millis(200));
        let nodes = vec![NodeTarget { name: "n1".into(), address: "203.0.113.1".into(), offline: false }];
        let results = runner.call(&nodes, "ping", &serde_json::Value::Null).await;
        assert!(!results["n1"].is_success());
        assert!(results["n1"].fail_msg.is_some());
    }
}
