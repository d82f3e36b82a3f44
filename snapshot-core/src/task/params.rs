//! Typed task parameters, one struct per task.

use crate::codec::{lenient_opt_u64, TaskPayload};
use crate::constants::{
    DEFAULT_CONTENT_PAGE_NUMBER, DESCRIPTION_PROP, MAX_CONTENT_PAGE_SIZE, MIN_CONTENT_PAGE_SIZE,
};
use crate::task::TaskName;
use crate::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn require_non_empty(task: TaskName, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SnapshotError::malformed(
            task.as_str(),
            format!("`{field}` must not be empty"),
        ));
    }
    Ok(())
}

/// Parameters of `create-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotTaskParameters {
    pub space_id: String,
    #[serde(default)]
    pub snapshot_properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl CreateSnapshotTaskParameters {
    pub fn new<S, D>(space_id: S, description: D, user_email: Option<String>) -> Self
    where
        S: Into<String>,
        D: Into<String>,
    {
        let mut snapshot_properties = BTreeMap::new();
        snapshot_properties.insert(DESCRIPTION_PROP.to_string(), description.into());
        Self {
            space_id: space_id.into(),
            snapshot_properties,
            user_email,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.snapshot_properties
            .get(DESCRIPTION_PROP)
            .map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty(Self::TASK, "spaceId", &self.space_id)
    }
}

impl TaskPayload for CreateSnapshotTaskParameters {
    const TASK: TaskName = TaskName::CreateSnapshot;
}

/// Parameters of `complete-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSnapshotTaskParameters {
    pub space_id: String,
}

impl CompleteSnapshotTaskParameters {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(Self::TASK, "spaceId", &self.space_id)
    }
}

impl TaskPayload for CompleteSnapshotTaskParameters {
    const TASK: TaskName = TaskName::CompleteSnapshot;
}

/// Parameters of `get-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSnapshotTaskParameters {
    pub snapshot_id: String,
}

impl GetSnapshotTaskParameters {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(Self::TASK, "snapshotId", &self.snapshot_id)
    }
}

impl TaskPayload for GetSnapshotTaskParameters {
    const TASK: TaskName = TaskName::GetSnapshot;
}

/// Parameters of `get-snapshots`; the listing is scoped by the handler's own store
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GetSnapshotsTaskParameters {}

impl TaskPayload for GetSnapshotsTaskParameters {
    const TASK: TaskName = TaskName::GetSnapshots;
}

fn default_page_number() -> i64 {
    DEFAULT_CONTENT_PAGE_NUMBER
}

/// Parameters of `get-snapshot-contents`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSnapshotContentsTaskParameters {
    pub snapshot_id: String,
    #[serde(default = "default_page_number")]
    pub page_number: i64,
    pub page_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl GetSnapshotContentsTaskParameters {
    /// Check the page window; shared by the client and the handler
    pub fn validate_paging(page_number: i64, page_size: i64) -> Result<()> {
        if page_number < DEFAULT_CONTENT_PAGE_NUMBER {
            return Err(SnapshotError::validation(format!(
                "pageNumber must be {DEFAULT_CONTENT_PAGE_NUMBER} or greater, got {page_number}"
            )));
        }
        if !(MIN_CONTENT_PAGE_SIZE..=MAX_CONTENT_PAGE_SIZE).contains(&page_size) {
            return Err(SnapshotError::validation(format!(
                "pageSize must be between {MIN_CONTENT_PAGE_SIZE} and {MAX_CONTENT_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty(Self::TASK, "snapshotId", &self.snapshot_id)?;
        Self::validate_paging(self.page_number, self.page_size)
    }
}

impl TaskPayload for GetSnapshotContentsTaskParameters {
    const TASK: TaskName = TaskName::GetSnapshotContents;
}

/// Parameters of `restore-snapshot`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSnapshotTaskParameters {
    pub snapshot_id: String,
    pub user_email: String,
}

impl RestoreSnapshotTaskParameters {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(Self::TASK, "snapshotId", &self.snapshot_id)?;
        require_non_empty(Self::TASK, "userEmail", &self.user_email)
    }
}

impl TaskPayload for RestoreSnapshotTaskParameters {
    const TASK: TaskName = TaskName::RestoreSnapshot;
}

/// Parameters of `get-restore`: exactly one of the two ids must be set
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetRestoreTaskParameters {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_u64"
    )]
    pub restore_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

/// Which restore a `get-restore` call is asking about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreLookup {
    ByRestoreId(u64),
    BySnapshotId(String),
}

impl GetRestoreTaskParameters {
    pub fn by_restore_id(restore_id: u64) -> Self {
        Self {
            restore_id: Some(restore_id),
            snapshot_id: None,
        }
    }

    pub fn by_snapshot_id<S: Into<String>>(snapshot_id: S) -> Self {
        Self {
            restore_id: None,
            snapshot_id: Some(snapshot_id.into()),
        }
    }

    pub fn lookup(&self) -> Result<RestoreLookup> {
        match (self.restore_id, self.snapshot_id.as_deref()) {
            (Some(id), None) => Ok(RestoreLookup::ByRestoreId(id)),
            (None, Some(snapshot_id)) if !snapshot_id.trim().is_empty() => {
                Ok(RestoreLookup::BySnapshotId(snapshot_id.to_string()))
            }
            (Some(_), Some(_)) => Err(SnapshotError::malformed(
                Self::TASK.as_str(),
                "only one of `restoreId` or `snapshotId` may be given",
            )),
            _ => Err(SnapshotError::malformed(
                Self::TASK.as_str(),
                "one of `restoreId` or `snapshotId` is required",
            )),
        }
    }
}

impl TaskPayload for GetRestoreTaskParameters {
    const TASK: TaskName = TaskName::GetRestore;
}
