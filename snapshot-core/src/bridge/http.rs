/*!
HTTP bridge gateway.

Sends bridge requests with an async `reqwest` client driven on the shared
runtime, so callers keep the blocking [`BridgeGateway`] interface.
*/

use super::{BridgeGateway, BridgeMethod, BridgeRequest, GLOBAL_RT};
use crate::config::BridgeConfig;
use crate::{Result, SnapshotError};
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use crate::observability::SnapshotMetrics;

/// Bridge gateway speaking HTTP, with optional basic authentication
///
/// # Example
/// ```rust,no_run
/// use snapshot_core::bridge::{BridgeGateway, BridgeRequest, HttpBridgeGateway};
/// use snapshot_core::config::BridgeConfig;
///
/// let gateway = HttpBridgeGateway::new(&BridgeConfig {
///     host: "bridge.example.org".to_string(),
///     port: "8080".to_string(),
///     username: Some("bridge-user".to_string()),
///     password: Some("secret".to_string()),
/// })?;
/// let body = gateway.send(&BridgeRequest::get("http://bridge.example.org:8080/snapshot"))?;
/// # Ok::<(), snapshot_core::SnapshotError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HttpBridgeGateway {
    client: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpBridgeGateway {
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("snapshot-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SnapshotError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn execute(&self, request: &BridgeRequest) -> Result<String> {
        let mut builder = match request.method {
            BridgeMethod::Get => self.client.get(&request.url),
            BridgeMethod::Post => self.client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        let response = builder.send().await.map_err(|e| {
            SnapshotError::bridge(format!("{} {} failed: {}", request.method, request.url, e))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            SnapshotError::bridge(format!(
                "Failed to read bridge response from {}: {}",
                request.url, e
            ))
        })?;

        if !status.is_success() {
            return Err(SnapshotError::bridge(format!(
                "{} {} returned {}: {}",
                request.method, request.url, status, text
            )));
        }
        Ok(text)
    }
}

impl BridgeGateway for HttpBridgeGateway {
    fn send(&self, request: &BridgeRequest) -> Result<String> {
        debug!(method = %request.method, url = %request.url, "Sending bridge request");

        #[cfg(feature = "metrics")]
        SnapshotMetrics::global().record_bridge_request();

        let result = GLOBAL_RT.block_on(self.execute(request));
        if let Err(e) = &result {
            warn!(url = %request.url, error = %e, "Bridge request failed");
            #[cfg(feature = "metrics")]
            SnapshotMetrics::global().record_bridge_error();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_bridge_is_unavailable() {
        let gateway = HttpBridgeGateway::new(&BridgeConfig {
            host: "127.0.0.1".to_string(),
            port: "9".to_string(),
            username: None,
            password: None,
        })
        .unwrap();

        // Port 9 (discard) is not expected to accept HTTP connections
        let err = gateway
            .send(&BridgeRequest::get("http://127.0.0.1:9/snapshot"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::BridgeUnavailable(_)));
        assert!(err.is_retryable());
    }
}
