/*!
Bridge gateway port.

The bridge is the external agent that moves snapshot and restore data. This
crate never talks to it directly from the handlers: every address and JSON
body is built here, and a [`BridgeGateway`] only delivers the finished
[`BridgeRequest`] and hands back the response body.
*/

#[cfg(feature = "http-bridge")]
pub mod http;
pub mod scripted;

use crate::codec::lenient_u64;
use crate::config::{BridgeConfig, StoreInstance};
use crate::task::RestoreStatus;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "http-bridge")]
pub use http::HttpBridgeGateway;
pub use scripted::ScriptedBridge;

#[cfg(feature = "async-rt")]
use once_cell::sync::Lazy;
#[cfg(feature = "async-rt")]
use tokio::runtime::Runtime;

/// Runtime driving async bridge clients behind the blocking gateway API
#[cfg(feature = "async-rt")]
pub(crate) static GLOBAL_RT: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 4))
        .enable_all()
        .build()
        .expect("Failed to create global async runtime")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMethod {
    Get,
    Post,
}

impl fmt::Display for BridgeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeMethod::Get => f.write_str("GET"),
            BridgeMethod::Post => f.write_str("POST"),
        }
    }
}

/// A fully addressed request for the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub method: BridgeMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// JSON body, sent with POST requests
    pub body: Option<String>,
}

impl BridgeRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: BridgeMethod::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post<S: Into<String>, B: Into<String>>(url: S, body: B) -> Self {
        Self {
            method: BridgeMethod::Post,
            url: url.into(),
            query: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_query<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Value of a query parameter, if present
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Delivers requests to the bridge
///
/// A gateway returns the raw response body. Failing to reach the bridge, or
/// a non-success answer from it, is reported as
/// [`crate::SnapshotError::BridgeUnavailable`].
#[cfg_attr(test, mockall::automock)]
pub trait BridgeGateway: Send + Sync {
    fn send(&self, request: &BridgeRequest) -> Result<String>;
}

/// Builds every bridge address used by the handlers
///
/// Path components are joined with `/` exactly as given, without URL
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEndpoint {
    host: String,
    port: String,
}

impl BridgeEndpoint {
    pub fn new<H: Into<String>, P: Into<String>>(host: H, port: P) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.host.clone(), config.port.clone())
    }

    /// `http://{bridgeHost}:{bridgePort}`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Address of the snapshot creation request
    ///
    /// `http://{bridgeHost}:{bridgePort}/snapshot/{dcHost}/{dcPort}/{dcStoreId}/{spaceId}/{snapshotId}`
    pub fn create_snapshot_url(
        &self,
        store: &StoreInstance,
        space_id: &str,
        snapshot_id: &str,
    ) -> String {
        format!(
            "{}/snapshot/{}/{}/{}/{}/{}",
            self.base_url(),
            store.host,
            store.port,
            store.store_id,
            space_id,
            snapshot_id
        )
    }

    pub fn snapshot_url(&self, snapshot_id: &str) -> String {
        format!("{}/snapshot/{}", self.base_url(), snapshot_id)
    }

    pub fn snapshots_url(&self) -> String {
        format!("{}/snapshot", self.base_url())
    }

    pub fn snapshot_contents_url(&self, snapshot_id: &str) -> String {
        format!("{}/snapshot/{}/content", self.base_url(), snapshot_id)
    }

    pub fn complete_snapshot_url(&self, snapshot_id: &str) -> String {
        format!("{}/snapshot/{}/complete", self.base_url(), snapshot_id)
    }

    pub fn restore_url(&self) -> String {
        format!("{}/restore", self.base_url())
    }

    pub fn restore_status_url(&self, restore_id: u64) -> String {
        format!("{}/restore/{}", self.base_url(), restore_id)
    }

    pub fn restore_by_snapshot_url(&self, snapshot_id: &str) -> String {
        format!("{}/restore/snapshot/{}", self.base_url(), snapshot_id)
    }
}

/// Body of the snapshot creation request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotBridgeParameters {
    pub description: String,
    pub user_email: String,
}

/// Body of the restore request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRestoreBridgeParameters {
    pub host: String,
    pub port: String,
    pub store_id: String,
    pub space_id: String,
    pub snapshot_id: String,
    pub user_email: String,
    pub restore_id: u64,
}

/// The bridge's acknowledgement of a restore request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRestoreBridgeResult {
    #[serde(deserialize_with = "lenient_u64")]
    pub restore_id: u64,
    pub status: RestoreStatus,
}

/// The bridge's answer to a completion notice
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSnapshotBridgeResult {
    #[serde(default)]
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StoreInstance {
        StoreInstance {
            host: "dc-host".to_string(),
            port: "dc-port".to_string(),
            store_id: "dc-store-id".to_string(),
        }
    }

    #[test]
    fn test_build_bridge_url() {
        let endpoint = BridgeEndpoint::new("bridge-host", "bridge-port");
        let url = endpoint.create_snapshot_url(&store(), "space-id", "snapshot-id");
        assert_eq!(
            url,
            "http://bridge-host:bridge-port/snapshot/dc-host/dc-port/dc-store-id/space-id/snapshot-id"
        );
    }

    #[test]
    fn test_status_urls() {
        let endpoint = BridgeEndpoint::new("b", "8080");
        assert_eq!(endpoint.snapshot_url("snap"), "http://b:8080/snapshot/snap");
        assert_eq!(endpoint.snapshots_url(), "http://b:8080/snapshot");
        assert_eq!(
            endpoint.snapshot_contents_url("snap"),
            "http://b:8080/snapshot/snap/content"
        );
        assert_eq!(
            endpoint.complete_snapshot_url("snap"),
            "http://b:8080/snapshot/snap/complete"
        );
        assert_eq!(endpoint.restore_url(), "http://b:8080/restore");
        assert_eq!(endpoint.restore_status_url(42), "http://b:8080/restore/42");
        assert_eq!(
            endpoint.restore_by_snapshot_url("snap"),
            "http://b:8080/restore/snapshot/snap"
        );
    }

    #[test]
    fn test_components_are_not_encoded() {
        let endpoint = BridgeEndpoint::new("b", "1");
        let url = endpoint.create_snapshot_url(&store(), "space with spaces", "id:1");
        assert!(url.ends_with("/space with spaces/id:1"));
    }

    #[test]
    fn test_request_query() {
        let request = BridgeRequest::get("http://b:1/snapshot")
            .with_query("host", "dc-host")
            .with_query("storeId", 0);
        assert_eq!(request.query_value("storeId"), Some("0"));
        assert_eq!(request.query_value("missing"), None);
        assert_eq!(request.method.to_string(), "GET");
    }

    #[test]
    fn test_restore_bridge_result_with_string_id() {
        let result: CreateRestoreBridgeResult =
            serde_json::from_str(r#"{"restoreId" : "1000", "status" : "INITIALIZED"}"#).unwrap();
        assert_eq!(result.restore_id, 1000);
        assert_eq!(result.status, RestoreStatus::Initialized);
    }
}
