//! End-to-end task flows: client -> dispatcher -> handlers -> scripted bridge.

use snapshot_core::acl::{AclType, SpaceAcls};
use snapshot_core::bridge::{BridgeEndpoint, BridgeMethod, ScriptedBridge};
use snapshot_core::config::{BridgeConfig, SnapshotConfig, StorageConfig, StoreInstance};
use snapshot_core::constants::{SNAPSHOT_PROPS_CONTENT_ID, SNAPSHOT_PROPS_CONTENT_TYPE};
use snapshot_core::properties::decode_properties;
use snapshot_core::storage::{LocalSpaceStorage, MemoryStorageProvider, StorageProvider};
use snapshot_core::{
    RestoreStatus, ServiceLifecycle, SnapshotError, SnapshotTaskClient, TaskDispatcher,
    TaskInvoker,
};
use std::sync::Arc;
use tempfile::TempDir;

const CREATE_PREFIX: &str = "http://bridge.example.org:8080/snapshot/dc.example.org/443/0/photos/";

fn config() -> SnapshotConfig {
    SnapshotConfig {
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
    }
}

fn original_acls() -> SpaceAcls {
    let mut acls = SpaceAcls::new();
    acls.insert("acl-editor".to_string(), AclType::Write);
    acls.insert("acl-viewer".to_string(), AclType::Read);
    acls.insert("acl-banned".to_string(), AclType::None);
    acls
}

fn endpoint() -> BridgeEndpoint {
    BridgeEndpoint::from_config(&config().bridge)
}

fn snapshot_status_body(snapshot_id: &str, status: &str) -> String {
    format!(
        r#"{{"snapshotId": "{snapshot_id}", "snapshotDate": "2024-03-01T12:00:00Z",
            "status": "{status}", "sourceHost": "dc.example.org", "sourceStoreId": "0",
            "sourceSpaceId": "photos", "description": "before migration",
            "contentItemCount": 12, "totalSizeInBytes": 4096}}"#
    )
}

struct Harness {
    provider: Arc<MemoryStorageProvider>,
    bridge: Arc<ScriptedBridge>,
    dispatcher: Arc<TaskDispatcher>,
    client: SnapshotTaskClient<Arc<TaskDispatcher>>,
}

fn harness() -> Harness {
    let provider = Arc::new(MemoryStorageProvider::new().with_space("photos", original_acls()));
    let bridge = Arc::new(ScriptedBridge::new());
    let dispatcher = Arc::new(TaskDispatcher::with_handlers(
        provider.clone(),
        bridge.clone(),
        &config(),
    ));
    let client = SnapshotTaskClient::new(Arc::clone(&dispatcher));
    Harness {
        provider,
        bridge,
        dispatcher,
        client,
    }
}

#[test]
fn test_snapshot_lifecycle() {
    let h = harness();
    h.bridge.respond_prefix(BridgeMethod::Post, CREATE_PREFIX, "");

    let created = h
        .client
        .create_snapshot("photos", "before migration", Some("ops@example.org"))
        .unwrap();
    assert!(created.snapshot_id.starts_with("dc.example.org_0_photos_"));

    // The space is frozen and the snapshot user can read it
    let locked = h.provider.get_space_acls("photos").unwrap();
    assert_eq!(locked.get("acl-editor"), Some(&AclType::Read));
    assert_eq!(locked.get("acl-viewer"), Some(&AclType::Read));
    assert_eq!(locked.get("acl-banned"), Some(&AclType::None));
    assert_eq!(locked.get("acl-snapshot-user"), Some(&AclType::Read));

    let stored = h
        .provider
        .content("photos", SNAPSHOT_PROPS_CONTENT_ID)
        .expect("snapshot properties written");
    assert_eq!(stored.content_type, SNAPSHOT_PROPS_CONTENT_TYPE);
    let props = decode_properties(std::str::from_utf8(&stored.data).unwrap()).unwrap();
    assert_eq!(props.get("description").map(String::as_str), Some("before migration"));
    assert_eq!(
        props.get("snapshot-id").map(String::as_str),
        Some(created.snapshot_id.as_str())
    );

    let requests = h.bridge.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        format!("{CREATE_PREFIX}{}", created.snapshot_id)
    );

    // Bridge reports the transfer finished
    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().snapshot_url(&created.snapshot_id),
        snapshot_status_body(&created.snapshot_id, "SNAPSHOT_COMPLETE"),
    );
    h.bridge.respond(
        BridgeMethod::Post,
        endpoint().complete_snapshot_url(&created.snapshot_id),
        r#"{"result": "Snapshot complete"}"#,
    );

    let snapshot = h.client.get_snapshot(&created.snapshot_id).unwrap();
    assert!(snapshot.status.is_complete());
    assert_eq!(snapshot.content_item_count, Some(12));

    let completed = h.client.complete_snapshot("photos").unwrap();
    assert_eq!(completed.result, "Snapshot complete");
    assert_eq!(h.provider.get_space_acls("photos").unwrap(), original_acls());
    assert!(h.provider.content("photos", SNAPSHOT_PROPS_CONTENT_ID).is_none());

    let status = h.dispatcher.report_status();
    assert_eq!(status.completed, 3);
    assert_eq!(status.failed, 0);
}

#[test]
fn test_bridge_failure_leaves_space_locked_for_recovery() {
    let h = harness();
    h.bridge
        .fail(BridgeMethod::Post, CREATE_PREFIX, "connection refused");

    let err = h
        .client
        .create_snapshot("photos", "before migration", None)
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SnapshotError::BridgeUnavailable(_)
    ));
    assert!(err.is_retryable());

    // No rollback: the lock and properties stay in place, marked as never handed off
    let locked = h.provider.get_space_acls("photos").unwrap();
    assert_eq!(locked.get("acl-editor"), Some(&AclType::Read));
    let stored = h
        .provider
        .content("photos", SNAPSHOT_PROPS_CONTENT_ID)
        .unwrap();
    let props = decode_properties(std::str::from_utf8(&stored.data).unwrap()).unwrap();
    assert_eq!(props.get("bridge-handoff").map(String::as_str), Some("failed"));

    // The bridge knows nothing of the snapshot; complete-snapshot must not ask it
    h.bridge
        .fail(BridgeMethod::Get, endpoint().base_url(), "404 Not Found");
    let completed = h.client.complete_snapshot("photos").unwrap();
    assert!(completed.result.contains("never started"));
    assert_eq!(h.provider.get_space_acls("photos").unwrap(), original_acls());
    assert!(h.provider.content("photos", SNAPSHOT_PROPS_CONTENT_ID).is_none());
    assert!(h
        .bridge
        .requests()
        .iter()
        .all(|request| request.method == BridgeMethod::Post));

    // The space can be snapshotted again
    h.bridge.respond_prefix(BridgeMethod::Post, CREATE_PREFIX, "");
    h.client.create_snapshot("photos", "second try", None).unwrap();
}

#[test]
fn test_second_snapshot_refused_until_completed() {
    let h = harness();
    h.bridge.respond_prefix(BridgeMethod::Post, CREATE_PREFIX, "");

    let first = h.client.create_snapshot("photos", "first", None).unwrap();
    let err = h
        .client
        .create_snapshot("photos", "second", None)
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SnapshotError::SpaceBusy { space_id } if space_id == "photos"
    ));
    assert_eq!(h.bridge.requests().len(), 1);

    // The first snapshot's record of the original access is untouched
    let stored = h
        .provider
        .content("photos", SNAPSHOT_PROPS_CONTENT_ID)
        .unwrap();
    let props = decode_properties(std::str::from_utf8(&stored.data).unwrap()).unwrap();
    assert_eq!(
        props.get("snapshot-id").map(String::as_str),
        Some(first.snapshot_id.as_str())
    );
    assert_eq!(props.get("space-acl.acl-editor").map(String::as_str), Some("WRITE"));

    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().snapshot_url(&first.snapshot_id),
        snapshot_status_body(&first.snapshot_id, "SNAPSHOT_COMPLETE"),
    );
    h.bridge.respond(
        BridgeMethod::Post,
        endpoint().complete_snapshot_url(&first.snapshot_id),
        r#"{"result": "Snapshot complete"}"#,
    );
    h.client.complete_snapshot("photos").unwrap();
    assert_eq!(h.provider.get_space_acls("photos").unwrap(), original_acls());
}

#[test]
fn test_complete_refuses_running_snapshot() {
    let h = harness();
    h.bridge.respond_prefix(BridgeMethod::Post, CREATE_PREFIX, "");
    let created = h.client.create_snapshot("photos", "nightly", None).unwrap();

    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().snapshot_url(&created.snapshot_id),
        snapshot_status_body(&created.snapshot_id, "TRANSFERRING_FROM_STORE"),
    );
    let err = h.client.complete_snapshot("photos").unwrap_err();
    assert!(matches!(err.root_cause(), SnapshotError::Validation(_)));

    let locked = h.provider.get_space_acls("photos").unwrap();
    assert_eq!(locked.get("acl-editor"), Some(&AclType::Read));
}

#[test]
fn test_property_write_failure_reports_no_snapshot() {
    let h = harness();
    h.provider.fail_content_writes(true);

    let err = h
        .client
        .create_snapshot("photos", "nightly", None)
        .unwrap_err();
    assert!(matches!(err.root_cause(), SnapshotError::StorageAccess(_)));
    assert!(h.bridge.requests().is_empty());
}

#[test]
fn test_missing_space() {
    let h = harness();
    let err = h
        .client
        .create_snapshot("no-such-space", "nightly", None)
        .unwrap_err();
    assert!(matches!(err.root_cause(), SnapshotError::NotFound(_)));
}

#[test]
fn test_restore_lifecycle() {
    let h = harness();
    h.bridge.respond(
        BridgeMethod::Post,
        endpoint().restore_url(),
        r#"{"restoreId": "42", "status": "INITIALIZED"}"#,
    );
    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().restore_status_url(42),
        r#"{"restoreId": 42, "snapshotId": "snap", "status": "RESTORATION_COMPLETE",
            "startDate": "2024-03-01T12:00:00Z", "endDate": "2024-03-01T13:00:00Z",
            "destinationHost": "dc.example.org", "destinationPort": "443",
            "destinationStoreId": "0", "destinationSpaceId": "restore-42"}"#,
    );

    let restore = h.client.restore_snapshot("snap", "ops@example.org").unwrap();
    assert_eq!(restore.restore_id, 42);
    assert_eq!(restore.status, RestoreStatus::Initialized);
    assert!(restore.space_id.starts_with("restore-"));
    assert!(h.provider.space_exists(&restore.space_id).unwrap());
    assert!(h.provider.get_space_acls(&restore.space_id).unwrap().is_empty());

    let body: serde_json::Value =
        serde_json::from_str(h.bridge.requests()[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["snapshotId"], "snap");
    assert_eq!(body["spaceId"], restore.space_id.as_str());

    let status = h.client.get_restore(42).unwrap();
    assert!(status.status.is_complete());
    assert!(status.end_date.is_some());
}

#[test]
fn test_listing_and_contents() {
    let h = harness();
    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().snapshots_url(),
        r#"{"snapshots": [{"snapshotId": "a", "description": "first"},
                          {"snapshotId": "b", "description": "second"}]}"#,
    );
    h.bridge.respond(
        BridgeMethod::Get,
        endpoint().snapshot_contents_url("a"),
        r#"{"contentItems": [{"contentId": "img/1.jpg", "contentProperties": {"size": "10"}}],
            "totalCount": 1}"#,
    );

    let list = h.client.get_snapshots().unwrap();
    assert_eq!(list.snapshots.len(), 2);

    let contents = h
        .client
        .get_snapshot_contents("a", 0, 100, Some("img/"))
        .unwrap();
    assert_eq!(contents.total_count, 1);
    assert_eq!(contents.content_items[0].content_id, "img/1.jpg");

    let requests = h.bridge.requests();
    let contents_request = requests.last().unwrap();
    assert_eq!(contents_request.query_value("page"), Some("0"));
    assert_eq!(contents_request.query_value("pageSize"), Some("100"));
    assert_eq!(contents_request.query_value("prefix"), Some("img/"));
}

#[test]
fn test_unknown_task_names() {
    let h = harness();
    for name in ["delete-space", "CREATE-SNAPSHOT", ""] {
        assert!(matches!(
            h.dispatcher.perform_task(name, "{}"),
            Err(SnapshotError::UnknownTask(_))
        ));
    }
    assert!(h.bridge.requests().is_empty());
}

#[test]
fn test_stopped_service_rejects_tasks() {
    let h = harness();
    h.dispatcher.stop().unwrap();
    let err = h.client.get_snapshots().unwrap_err();
    assert!(matches!(err.root_cause(), SnapshotError::StorageAccess(_)));
    assert!(h.bridge.requests().is_empty());
}

#[test]
fn test_snapshot_with_local_storage() {
    let temp_dir = TempDir::new().unwrap();
    let storage = LocalSpaceStorage::new(temp_dir.path());
    storage.create_space("photos").unwrap();
    storage.set_space_acls("photos", &original_acls()).unwrap();

    let bridge = Arc::new(ScriptedBridge::new());
    bridge.respond_prefix(BridgeMethod::Post, CREATE_PREFIX, "");
    let client = SnapshotTaskClient::new(TaskDispatcher::with_handlers(
        Arc::new(storage.clone()),
        bridge,
        &config(),
    ));

    client.create_snapshot("photos", "nightly", None).unwrap();

    let reopened = LocalSpaceStorage::new(temp_dir.path());
    let locked = reopened.get_space_acls("photos").unwrap();
    assert_eq!(locked.get("acl-snapshot-user"), Some(&AclType::Read));
    assert!(temp_dir
        .path()
        .join("photos")
        .join(SNAPSHOT_PROPS_CONTENT_ID)
        .exists());
}
