//! Typed task results, one struct per task.

use crate::codec::{lenient_u64, TaskPayload};
use crate::task::status::{RestoreStatus, SnapshotStatus};
use crate::task::TaskName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of `create-snapshot`; carries the snapshot id and nothing else
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotTaskResult {
    pub snapshot_id: String,
}

impl TaskPayload for CreateSnapshotTaskResult {
    const TASK: TaskName = TaskName::CreateSnapshot;
}

/// Result of `complete-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSnapshotTaskResult {
    pub result: String,
}

impl TaskPayload for CompleteSnapshotTaskResult {
    const TASK: TaskName = TaskName::CompleteSnapshot;
}

/// Result of `get-snapshot`, as reported by the bridge
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSnapshotTaskResult {
    pub snapshot_id: String,
    pub snapshot_date: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub source_host: String,
    pub source_store_id: String,
    pub source_space_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_item_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size_in_bytes: Option<u64>,
}

impl TaskPayload for GetSnapshotTaskResult {
    const TASK: TaskName = TaskName::GetSnapshot;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    #[serde(default)]
    pub description: String,
}

/// Result of `get-snapshots`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSnapshotListTaskResult {
    #[serde(default)]
    pub snapshots: Vec<SnapshotSummary>,
}

impl TaskPayload for GetSnapshotListTaskResult {
    const TASK: TaskName = TaskName::GetSnapshots;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContentItem {
    pub content_id: String,
    #[serde(default)]
    pub content_properties: BTreeMap<String, String>,
}

/// Result of `get-snapshot-contents`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSnapshotContentsTaskResult {
    #[serde(default)]
    pub content_items: Vec<SnapshotContentItem>,
    #[serde(default)]
    pub total_count: u64,
}

impl TaskPayload for GetSnapshotContentsTaskResult {
    const TASK: TaskName = TaskName::GetSnapshotContents;
}

/// Result of `restore-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSnapshotTaskResult {
    /// The landing space the snapshot is being restored into
    pub space_id: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub restore_id: u64,
    pub status: RestoreStatus,
}

impl TaskPayload for RestoreSnapshotTaskResult {
    const TASK: TaskName = TaskName::RestoreSnapshot;
}

/// Result of `get-restore`, as reported by the bridge
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetRestoreTaskResult {
    #[serde(deserialize_with = "lenient_u64")]
    pub restore_id: u64,
    pub snapshot_id: String,
    pub status: RestoreStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub destination_host: String,
    pub destination_port: String,
    pub destination_store_id: String,
    pub destination_space_id: String,
}

impl TaskPayload for GetRestoreTaskResult {
    const TASK: TaskName = TaskName::GetRestore;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_create_snapshot_result() {
        let result = CreateSnapshotTaskResult {
            snapshot_id: "snapshot-id".to_string(),
        };
        let encoded = result.to_envelope().unwrap();
        let clean: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(clean, "{\"snapshotId\":\"snapshot-id\"}");
    }

    #[test]
    fn test_results_decode_to_equal_values() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let restore = GetRestoreTaskResult {
            restore_id: 1000,
            snapshot_id: "host_store_space_2024".to_string(),
            status: RestoreStatus::TransferringToStore,
            status_text: Some("copying".to_string()),
            start_date: started,
            end_date: None,
            destination_host: "dc.example.org".to_string(),
            destination_port: "443".to_string(),
            destination_store_id: "0".to_string(),
            destination_space_id: "restore-1000".to_string(),
        };
        let decoded = GetRestoreTaskResult::from_envelope(&restore.to_envelope().unwrap()).unwrap();
        assert_eq!(decoded, restore);

        let mut content_properties = BTreeMap::new();
        content_properties.insert("checksum".to_string(), "abc".to_string());
        let contents = GetSnapshotContentsTaskResult {
            content_items: vec![SnapshotContentItem {
                content_id: "a/b.txt".to_string(),
                content_properties,
            }],
            total_count: 1,
        };
        let decoded =
            GetSnapshotContentsTaskResult::from_envelope(&contents.to_envelope().unwrap()).unwrap();
        assert_eq!(decoded, contents);
    }

    #[test]
    fn test_restore_result_accepts_string_id() {
        let result = RestoreSnapshotTaskResult::from_envelope(
            r#"{"spaceId": "restore-5", "restoreId": "5", "status": "INITIALIZED"}"#,
        )
        .unwrap();
        assert_eq!(result.restore_id, 5);
        assert_eq!(result.status, RestoreStatus::Initialized);
    }
}
