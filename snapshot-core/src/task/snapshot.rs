/*!
Snapshot task handler.

`create-snapshot` freezes a space and hands it to the bridge:

1. parse and validate the parameters
2. take the space lease and refuse a space whose last snapshot is still
   outstanding
3. downgrade the space ACLs to read-only
4. persist the snapshot properties, including the pre-lock ACL list
5. address the bridge and send the creation request
6. answer with the snapshot id

A space holds at most one snapshot at a time: its properties object exists
from step 4 until `complete-snapshot` removes it.

Nothing is rolled back when a later step fails. The ACL list in force before
the lock is logged with the failure. If the bridge refuses the handoff, the
properties are marked with `bridge-handoff=failed` and `complete-snapshot`
puts the ACLs back without asking the bridge for a status it never had.
*/

use crate::acl::{snapshot_principal, AccessControlAdjuster, AclType, SpaceAcls};
use crate::bridge::{
    BridgeEndpoint, BridgeGateway, BridgeRequest, CompleteSnapshotBridgeResult,
    CreateSnapshotBridgeParameters,
};
use crate::codec::{decode, encode, TaskPayload};
use crate::config::{SnapshotConfig, StoreInstance};
use crate::constants::{
    BRIDGE_HANDOFF_FAILED, BRIDGE_HANDOFF_PROP, DESCRIPTION_PROP, ORIGINAL_ACL_PROP_PREFIX, SNAPSHOT_ID_DATE_FORMAT, SNAPSHOT_ID_PROP,
    SPACE_ID_PROP, USER_EMAIL_PROP,
};
use crate::dispatcher::TaskRunner;
use crate::lease::SpaceLeases;
use crate::properties::{PropertyPersister, SnapshotProperties};
use crate::storage::StorageProvider;
use crate::task::{
    CompleteSnapshotTaskParameters, CompleteSnapshotTaskResult, CreateSnapshotTaskParameters,
    CreateSnapshotTaskResult, GetSnapshotContentsTaskParameters, GetSnapshotContentsTaskResult,
    GetSnapshotListTaskResult, GetSnapshotTaskParameters, GetSnapshotTaskResult,
    GetSnapshotsTaskParameters, TaskName,
};
use crate::{Result, SnapshotError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SUPPORTED: [TaskName; 5] = [
    TaskName::CreateSnapshot,
    TaskName::CompleteSnapshot,
    TaskName::GetSnapshots,
    TaskName::GetSnapshot,
    TaskName::GetSnapshotContents,
];

/// Serves the snapshot side of the task set
pub struct SnapshotTaskHandler {
    provider: Arc<dyn StorageProvider>,
    bridge: Arc<dyn BridgeGateway>,
    endpoint: BridgeEndpoint,
    store: StoreInstance,
    snapshot_user: String,
    leases: SpaceLeases,
}

impl SnapshotTaskHandler {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        bridge: Arc<dyn BridgeGateway>,
        config: &SnapshotConfig,
    ) -> Self {
        Self {
            provider,
            bridge,
            endpoint: BridgeEndpoint::from_config(&config.bridge),
            store: config.store.clone(),
            snapshot_user: config.snapshot_user.clone(),
            leases: SpaceLeases::new(),
        }
    }

    /// Bridge address of the creation request for `snapshot_id` of `space_id`
    pub fn build_snapshot_url(&self, space_id: &str, snapshot_id: &str) -> String {
        self.endpoint
            .create_snapshot_url(&self.store, space_id, snapshot_id)
    }

    /// `{dcHost}_{dcStoreId}_{spaceId}_{timestamp}`
    pub fn generate_snapshot_id(&self, space_id: &str, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}_{}",
            self.store.host,
            self.store.store_id,
            space_id,
            timestamp.format(SNAPSHOT_ID_DATE_FORMAT)
        )
    }

    /// Properties recorded in the space for the lifetime of the snapshot
    pub fn build_snapshot_props(
        params: &CreateSnapshotTaskParameters,
        snapshot_id: &str,
        original_acls: &SpaceAcls,
    ) -> SnapshotProperties {
        let mut props = params.snapshot_properties.clone();
        props.entry(DESCRIPTION_PROP.to_string()).or_default();
        if let Some(email) = &params.user_email {
            props.insert(USER_EMAIL_PROP.to_string(), email.clone());
        }
        props.insert(SPACE_ID_PROP.to_string(), params.space_id.clone());
        props.insert(SNAPSHOT_ID_PROP.to_string(), snapshot_id.to_string());
        for (principal, acl) in original_acls {
            props.insert(
                format!("{ORIGINAL_ACL_PROP_PREFIX}{principal}"),
                acl.to_string(),
            );
        }
        props
    }

    pub fn create_snapshot(
        &self,
        params: &CreateSnapshotTaskParameters,
    ) -> Result<CreateSnapshotTaskResult> {
        params.validate()?;
        let space_id = params.space_id.as_str();
        let principal = snapshot_principal(&self.snapshot_user);

        let _lease = self.leases.acquire(space_id)?;
        let persister = PropertyPersister::new(self.provider.as_ref());
        if persister.has_properties(space_id)? {
            warn!(space_id = %space_id, "Refusing snapshot: previous snapshot not completed");
            return Err(SnapshotError::SpaceBusy {
                space_id: space_id.to_string(),
            });
        }

        let original_acls = AccessControlAdjuster::new(self.provider.as_ref())
            .make_read_only_for_snapshot(space_id, &principal)?;

        let snapshot_id = self.generate_snapshot_id(space_id, Utc::now());
        let mut props = Self::build_snapshot_props(params, &snapshot_id, &original_acls);
        if let Err(e) = persister.store_properties(space_id, &props) {
            error!(
                space_id = %space_id,
                original_acls = ?original_acls,
                error = %e,
                "Space left read-only: snapshot properties could not be written"
            );
            return Err(e);
        }

        let body = encode(
            TaskName::CreateSnapshot,
            &CreateSnapshotBridgeParameters {
                description: params.description().unwrap_or_default().to_string(),
                user_email: params.user_email.clone().unwrap_or_default(),
            },
        )?;
        let request = BridgeRequest::post(self.build_snapshot_url(space_id, &snapshot_id), body);
        if let Err(e) = self.bridge.send(&request) {
            warn!(
                space_id = %space_id,
                snapshot_id = %snapshot_id,
                original_acls = ?original_acls,
                error = %e,
                "Bridge handoff failed; space stays read-only until complete-snapshot runs"
            );
            props.insert(BRIDGE_HANDOFF_PROP.to_string(), BRIDGE_HANDOFF_FAILED.to_string());
            if let Err(mark_err) = persister.store_properties(space_id, &props) {
                error!(
                    space_id = %space_id,
                    error = %mark_err,
                    "Failed handoff could not be recorded; complete-snapshot will need the bridge"
                );
            }
            return Err(e);
        }

        info!(space_id = %space_id, snapshot_id = %snapshot_id, "Snapshot handed to bridge");
        Ok(CreateSnapshotTaskResult { snapshot_id })
    }

    /// Put back the ACLs recorded at lock time once the bridge reports the
    /// transfer finished, then clear the snapshot properties
    ///
    /// A snapshot the bridge never accepted is released without a status check.
    pub fn complete_snapshot(
        &self,
        params: &CompleteSnapshotTaskParameters,
    ) -> Result<CompleteSnapshotTaskResult> {
        params.validate()?;
        let space_id = params.space_id.as_str();
        let persister = PropertyPersister::new(self.provider.as_ref());

        let props = persister.load_properties(space_id)?;
        let snapshot_id = props.get(SNAPSHOT_ID_PROP).cloned().ok_or_else(|| {
            SnapshotError::storage(format!(
                "snapshot properties in {space_id} carry no {SNAPSHOT_ID_PROP}"
            ))
        })?;
        let original_acls = original_acls_from_props(&props)?;

        if props.get(BRIDGE_HANDOFF_PROP).map(String::as_str) == Some(BRIDGE_HANDOFF_FAILED) {
            AccessControlAdjuster::new(self.provider.as_ref())
                .restore_acls(space_id, &original_acls)?;
            persister.remove_properties(space_id)?;
            info!(
                space_id = %space_id,
                snapshot_id = %snapshot_id,
                "Released snapshot that never reached the bridge"
            );
            return Ok(CompleteSnapshotTaskResult {
                result: format!(
                    "Access to space {space_id} restored; snapshot {snapshot_id} was never started"
                ),
            });
        }

        let snapshot = self.get_snapshot(&GetSnapshotTaskParameters {
            snapshot_id: snapshot_id.clone(),
        })?;
        if !snapshot.status.is_terminal() {
            return Err(SnapshotError::validation(format!(
                "snapshot {snapshot_id} is still {}",
                snapshot.status
            )));
        }

        AccessControlAdjuster::new(self.provider.as_ref()).restore_acls(space_id, &original_acls)?;

        let mut result = format!("Access to space {space_id} restored");
        if snapshot.status.is_complete() {
            let text = self.bridge.send(&BridgeRequest::post(
                self.endpoint.complete_snapshot_url(&snapshot_id),
                "{}",
            ))?;
            let ack: CompleteSnapshotBridgeResult = decode(TaskName::CompleteSnapshot, &text)?;
            if !ack.result.is_empty() {
                result = ack.result;
            }
        } else {
            warn!(snapshot_id = %snapshot_id, status = %snapshot.status, "Snapshot ended without completing");
        }

        persister.remove_properties(space_id)?;
        info!(space_id = %space_id, snapshot_id = %snapshot_id, "Snapshot completed");
        Ok(CompleteSnapshotTaskResult { result })
    }

    pub fn get_snapshot(&self, params: &GetSnapshotTaskParameters) -> Result<GetSnapshotTaskResult> {
        params.validate()?;
        let text = self
            .bridge
            .send(&BridgeRequest::get(self.endpoint.snapshot_url(&params.snapshot_id)))?;
        GetSnapshotTaskResult::from_envelope(&text)
    }

    /// Snapshots taken from this storage instance
    pub fn get_snapshots(&self, _params: &GetSnapshotsTaskParameters) -> Result<GetSnapshotListTaskResult> {
        let request = BridgeRequest::get(self.endpoint.snapshots_url())
            .with_query("host", &self.store.host)
            .with_query("storeId", &self.store.store_id);
        let text = self.bridge.send(&request)?;
        GetSnapshotListTaskResult::from_envelope(&text)
    }

    pub fn get_snapshot_contents(
        &self,
        params: &GetSnapshotContentsTaskParameters,
    ) -> Result<GetSnapshotContentsTaskResult> {
        params.validate()?;
        let mut request = BridgeRequest::get(self.endpoint.snapshot_contents_url(&params.snapshot_id))
            .with_query("page", params.page_number)
            .with_query("pageSize", params.page_size);
        if let Some(prefix) = &params.prefix {
            request = request.with_query("prefix", prefix);
        }
        let text = self.bridge.send(&request)?;
        GetSnapshotContentsTaskResult::from_envelope(&text)
    }
}

/// Recover the ACL list recorded under `space-acl.*` keys
fn original_acls_from_props(props: &SnapshotProperties) -> Result<SpaceAcls> {
    props
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(ORIGINAL_ACL_PROP_PREFIX)
                .map(|principal| (principal, value))
        })
        .map(|(principal, value)| {
            let acl = value.parse::<AclType>().map_err(|e| {
                SnapshotError::storage(format!("recorded ACL for {principal}: {e}"))
            })?;
            Ok((principal.to_string(), acl))
        })
        .collect()
}

impl TaskRunner for SnapshotTaskHandler {
    fn supported_tasks(&self) -> &[TaskName] {
        &SUPPORTED
    }

    fn perform_task(&self, task: TaskName, params: &str) -> Result<String> {
        debug!(task = %task, "Snapshot handler invoked");
        match task {
            TaskName::CreateSnapshot => self
                .create_snapshot(&CreateSnapshotTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            TaskName::CompleteSnapshot => self
                .complete_snapshot(&CompleteSnapshotTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            TaskName::GetSnapshot => self
                .get_snapshot(&GetSnapshotTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            TaskName::GetSnapshots => self
                .get_snapshots(&GetSnapshotsTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            TaskName::GetSnapshotContents => self
                .get_snapshot_contents(&GetSnapshotContentsTaskParameters::from_envelope(params)?)?
                .to_envelope(),
            other => Err(SnapshotError::UnknownTask(other.to_string())),
        }
    }
}
