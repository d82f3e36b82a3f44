/*!
# Snapshot Task Core

Named-task handlers that snapshot a storage space and restore it again
through an external transfer agent, the bridge.

Callers never move data themselves. They invoke a task by name with a JSON
parameter string; the handlers adjust space ACLs, record snapshot
properties in the space, and hand a fully addressed request to the bridge.
Progress is then observed by polling the bridge for status.

## Architecture

- [`codec`] and [`task`]: typed parameters and results for every task name
- [`acl`] and [`properties`]: the two storage side effects of a snapshot
- [`storage`] and [`bridge`]: ports with in-process and real adapters
- [`dispatcher`]: resolves a task name and routes it to its handler
- [`client`]: typed façade over any task invoker

## Usage

```rust
use snapshot_core::acl::{AclType, SpaceAcls};
use snapshot_core::bridge::ScriptedBridge;
use snapshot_core::config::{BridgeConfig, SnapshotConfig, StorageConfig, StoreInstance};
use snapshot_core::storage::MemoryStorageProvider;
use snapshot_core::{SnapshotTaskClient, TaskDispatcher};
use std::sync::Arc;

let config = SnapshotConfig {
    store: StoreInstance {
        host: "dc.example.org".to_string(),
        port: "443".to_string(),
        store_id: "0".to_string(),
    },
    snapshot_user: "snapshot-user".to_string(),
    bridge: BridgeConfig {
        host: "bridge.example.org".to_string(),
        port: "8080".to_string(),
        username: None,
        password: None,
    },
    storage: StorageConfig::memory(),
};

let mut acls = SpaceAcls::new();
acls.insert("acl-editor".to_string(), AclType::Write);
let provider = Arc::new(MemoryStorageProvider::new().with_space("photos", acls));

// Swap in `HttpBridgeGateway` to talk to a running bridge
let bridge = Arc::new(ScriptedBridge::new());

let dispatcher = TaskDispatcher::with_handlers(provider.clone(), bridge.clone(), &config);
let client = SnapshotTaskClient::new(dispatcher);

match client.create_snapshot("photos", "before migration", None) {
    Ok(result) => println!("snapshot {}", result.snapshot_id),
    Err(e) => eprintln!("snapshot failed: {e}"),
}
```
*/

pub mod acl;
pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod lease;
pub mod observability;
pub mod properties;
pub mod storage;
pub mod task;


pub use client::SnapshotTaskClient;
pub use config::{BridgeConfig, SnapshotConfig, StorageBackend, StorageConfig, StoreInstance};
pub use dispatcher::{ServiceLifecycle, ServiceStatus, TaskDispatcher, TaskInvoker, TaskRunner};
pub use error::{Result, SnapshotError};
pub use storage::{LocalSpaceStorage, MemoryStorageProvider, StorageProvider};
pub use task::{RestoreStatus, SnapshotStatus, TaskName};
