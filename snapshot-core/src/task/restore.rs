//! Restore task handler.
//!
//! A restore lands in a fresh space named after its restore id. The space is
//! created here, before the bridge is asked to fill it; no ACLs are touched
//! on this path.
//!
//! Restore ids come from a per-handler counter seeded with the current time
//! in milliseconds. Handlers in different processes can hand out the same
//! id; an id whose landing space already exists is skipped.

use crate::bridge::{
    BridgeEndpoint, BridgeGateway, BridgeRequest, CreateRestoreBridgeParameters,
    CreateRestoreBridgeResult,
};
use crate::codec::{decode, encode, TaskPayload};
use crate::config::{SnapshotConfig, StoreInstance};
use crate::constants::RESTORE_SPACE_PREFIX;
use crate::dispatcher::TaskRunner;
use crate::storage::StorageProvider;
use crate::task::{
    GetRestoreTaskParameters, GetRestoreTaskResult, RestoreLookup, RestoreSnapshotTaskParameters,
    RestoreSnapshotTaskResult, TaskName,
};
use crate::{Result, SnapshotError};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUPPORTED: [TaskName; 2] = [TaskName::RestoreSnapshot, TaskName::GetRestore];

/// Ids tried before giving up on finding an unused landing space
const MAX_RESTORE_ID_ATTEMPTS: usize = 16;

/// Serves `restore-snapshot` and `get-restore`
pub struct RestoreTaskHandler {
    provider: Arc<dyn StorageProvider>,
    bridge: Arc<dyn BridgeGateway>,
    endpoint: BridgeEndpoint,
    store: StoreInstance,
    next_restore_id: AtomicU64,
}

impl RestoreTaskHandler {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        bridge: Arc<dyn BridgeGateway>,
        config: &SnapshotConfig,
    ) -> Self {
        // Seeded from the clock so ids stay distinct across process restarts
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            provider,
            bridge,
            endpoint: BridgeEndpoint::from_config(&config.bridge),
            store: config.store.clone(),
            next_restore_id: AtomicU64::new(seed),
        }
    }

    /// Start allocating restore ids at `first`
    pub fn with_first_restore_id(self, first: u64) -> Self {
        self.next_restore_id.store(first, Ordering::SeqCst);
        self
    }

    fn allocate_restore_id(&self) -> u64 {
        self.next_restore_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn restore_space_id(restore_id: u64) -> String {
        format!("{RESTORE_SPACE_PREFIX}{restore_id}")
    }

    /// Allocate a restore id and create its landing space
    fn create_landing_space(&self) -> Result<(u64, String)> {
        for _ in 0..MAX_RESTORE_ID_ATTEMPTS {
            let restore_id = self.allocate_restore_id();
            let space_id = Self::restore_space_id(restore_id);
            if self.provider.space_exists(&space_id)? {
                debug!(space_id = %space_id, "Restore id taken, trying the next one");
                continue;
            }
            self.provider.create_space(&space_id)?;
            return Ok((restore_id, space_id));
        }
        Err(SnapshotError::storage(format!(
            "no free restore space after {MAX_RESTORE_ID_ATTEMPTS} ids"
        )))
    }

    pub fn restore_snapshot(
        &self,
        params: &RestoreSnapshotTaskParameters,
    ) -> Result<RestoreSnapshotTaskResult> {
        params.validate()?;
        let (restore_id, space_id) = self.create_landing_space()?;
        debug!(space_id = %space_id, restore_id, "Restore landing space created");

        let body = encode(
            TaskName::RestoreSnapshot,
            &CreateRestoreBridgeParameters {
                host: self.store.host.clone(),
                port: self.store.port.clone(),
                store_id: self.store.store_id.clone(),
                space_id: space_id.clone(),
                snapshot_id: params.snapshot_id.clone(),
                user_email: params.user_email.clone(),
                restore_id,
            },
        )?;
        let text = self
            .bridge
            .send(&BridgeRequest::post(self.endpoint.restore_url(), body))
            .map_err(|e| {
                warn!(
                    space_id = %space_id,
                    snapshot_id = %params.snapshot_id,
                    error = %e,
                    "Restore handoff failed; landing space left in place"
                );
                e
            })?;
        let ack: CreateRestoreBridgeResult = decode(TaskName::RestoreSnapshot, &text)?;

        if ack.restore_id != restore_id {
            warn!(
                requested = restore_id,
                acknowledged = ack.restore_id,
                "Bridge assigned a different restore id"
            );
        }

        info!(
            snapshot_id = %params.snapshot_id,
            restore_id = ack.restore_id,
            space_id = %space_id,
            "Restore handed to bridge"
        );
        Ok(RestoreSnapshotTaskResult {
            space_id,
            restore_id: ack.restore_id,
            status: ack.status,
        })
    }

    pub fn get_restore(&self, params: &GetRestoreTaskParameters) -> Result<GetRestoreTaskResult> {
        let url = match params.lookup()? {
            RestoreLookup::ByRestoreId(restore_id) => self.endpoint.restore_status_url(restore_id),
            RestoreLookup::BySnapshotId(snapshot_id) => {
                self.endpoint.restore_by_snapshot_url(&snapshot_id)
            }
        };
        let text = self.bridge.send(&BridgeRequest::get(url))?;
        GetRestoreTaskResult::from_envelope(&text)
    }
}

impl TaskRunner for RestoreTaskHandler {
    fn supported_tasks(&self) -> &[TaskName] {
        &SUPPORTED
    }

    fn perform_task(&self, task: TaskName, params: &str) -> Result<String> {
        match task {
            TaskName::RestoreSnapshot => self
                .restore_snapshot(&RestoreSnapshotTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            TaskName::GetRestore => self
                .get_restore(&GetRestoreTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            other => Err(SnapshotError::UnknownTask(other.to_string())),
        }
    }
}
