//! In-process bridge with canned responses.
//!
//! Records every request it receives and answers from routes registered by
//! method and URL. Used by tests and by embedders that run the task handlers
//! without a bridge process.

use super::{BridgeGateway, BridgeMethod, BridgeRequest};
use crate::{Result, SnapshotError};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Unavailable(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: BridgeMethod,
    url: String,
    prefix: bool,
    reply: Reply,
}

impl Route {
    fn matches(&self, request: &BridgeRequest) -> bool {
        self.method == request.method
            && if self.prefix {
                request.url.starts_with(&self.url)
            } else {
                request.url == self.url
            }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedBridge {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<BridgeRequest>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method url` with `body`; later registrations win
    pub fn respond<U: Into<String>, B: Into<String>>(&self, method: BridgeMethod, url: U, body: B) {
        self.push(method, url.into(), false, Reply::Body(body.into()));
    }

    /// Answer every `method` request whose URL starts with `prefix`
    pub fn respond_prefix<U: Into<String>, B: Into<String>>(
        &self,
        method: BridgeMethod,
        prefix: U,
        body: B,
    ) {
        self.push(method, prefix.into(), true, Reply::Body(body.into()));
    }

    /// Fail every `method` request under `url` as if the bridge could not be reached
    pub fn fail<U: Into<String>, M: Into<String>>(&self, method: BridgeMethod, url: U, message: M) {
        self.push(method, url.into(), true, Reply::Unavailable(message.into()));
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<BridgeRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn push(&self, method: BridgeMethod, url: String, prefix: bool, reply: Reply) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route {
                method,
                url,
                prefix,
                reply,
            });
        }
    }
}

impl BridgeGateway for ScriptedBridge {
    fn send(&self, request: &BridgeRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let routes = self
            .routes
            .lock()
            .map_err(|e| SnapshotError::bridge(format!("scripted bridge lock poisoned: {e}")))?;
        let route = routes
            .iter()
            .rev()
            .find(|route| route.matches(request))
            .ok_or_else(|| {
                SnapshotError::bridge(format!("no route for {} {}", request.method, request.url))
            })?;

        match &route.reply {
            Reply::Body(body) => Ok(body.clone()),
            Reply::Unavailable(message) => Err(SnapshotError::bridge(message.clone())),
        }
    }
}
