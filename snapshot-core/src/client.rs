/*!
Typed task client.

[`SnapshotTaskClient`] wraps any [`TaskInvoker`] and exposes one typed method
per task. Each call encodes its parameters, invokes the named task, and
decodes the result. Failures from the invocation itself are wrapped in
[`SnapshotError::TaskInvocation`] with the cause left untouched.
*/

use crate::codec::TaskPayload;
use crate::dispatcher::TaskInvoker;
use crate::task::{
    CompleteSnapshotTaskParameters, CompleteSnapshotTaskResult, CreateSnapshotTaskParameters,
    CreateSnapshotTaskResult, GetRestoreTaskParameters, GetRestoreTaskResult,
    GetSnapshotContentsTaskParameters, GetSnapshotContentsTaskResult, GetSnapshotListTaskResult,
    GetSnapshotTaskParameters, GetSnapshotTaskResult, GetSnapshotsTaskParameters,
    RestoreSnapshotTaskParameters, RestoreSnapshotTaskResult, RestoreStatus, SnapshotStatus,
};
use crate::{Result, SnapshotError};
use snapshot_poll::{poll_until, ExponentialBackoff, PollError, PollState};
use std::cell::Cell;
use tracing::{debug, warn};

pub struct SnapshotTaskClient<I: TaskInvoker> {
    invoker: I,
}

impl<I: TaskInvoker> SnapshotTaskClient<I> {
    pub fn new(invoker: I) -> Self {
        Self { invoker }
    }

    fn call<P, R>(&self, params: &P) -> Result<R>
    where
        P: TaskPayload,
        R: TaskPayload,
    {
        let task = P::TASK;
        let body = params.to_envelope()?;
        debug!(task = %task, "Invoking task");
        let text = self
            .invoker
            .perform_task(task.as_str(), &body)
            .map_err(|e| SnapshotError::invocation(task.as_str(), e))?;
        R::from_envelope(&text)
    }

    pub fn create_snapshot(
        &self,
        space_id: &str,
        description: &str,
        user_email: Option<&str>,
    ) -> Result<CreateSnapshotTaskResult> {
        let params = CreateSnapshotTaskParameters::new(
            space_id,
            description,
            user_email.map(str::to_string),
        );
        self.call(&params)
    }

    pub fn get_snapshot(&self, snapshot_id: &str) -> Result<GetSnapshotTaskResult> {
        self.call(&GetSnapshotTaskParameters {
            snapshot_id: snapshot_id.to_string(),
        })
    }

    pub fn complete_snapshot(&self, space_id: &str) -> Result<CompleteSnapshotTaskResult> {
        self.call(&CompleteSnapshotTaskParameters {
            space_id: space_id.to_string(),
        })
    }

    pub fn get_snapshots(&self) -> Result<GetSnapshotListTaskResult> {
        self.call(&GetSnapshotsTaskParameters::default())
    }

    /// List one page of a snapshot's content
    ///
    /// `page_number` must be 0 or greater and `page_size` between 1 and 1000;
    /// out-of-range values fail with [`SnapshotError::Validation`] without
    /// invoking a task.
    pub fn get_snapshot_contents(
        &self,
        snapshot_id: &str,
        page_number: i64,
        page_size: i64,
        prefix: Option<&str>,
    ) -> Result<GetSnapshotContentsTaskResult> {
        GetSnapshotContentsTaskParameters::validate_paging(page_number, page_size)?;
        self.call(&GetSnapshotContentsTaskParameters {
            snapshot_id: snapshot_id.to_string(),
            page_number,
            page_size,
            prefix: prefix.map(str::to_string),
        })
    }

    pub fn restore_snapshot(
        &self,
        snapshot_id: &str,
        user_email: &str,
    ) -> Result<RestoreSnapshotTaskResult> {
        self.call(&RestoreSnapshotTaskParameters {
            snapshot_id: snapshot_id.to_string(),
            user_email: user_email.to_string(),
        })
    }

    pub fn get_restore(&self, restore_id: u64) -> Result<GetRestoreTaskResult> {
        self.call(&GetRestoreTaskParameters::by_restore_id(restore_id))
    }

    pub fn get_restore_by_snapshot(&self, snapshot_id: &str) -> Result<GetRestoreTaskResult> {
        self.call(&GetRestoreTaskParameters::by_snapshot_id(snapshot_id))
    }

    /// Poll `get-snapshot` until the snapshot reaches a terminal status
    pub fn wait_for_snapshot(
        &self,
        snapshot_id: &str,
        policy: ExponentialBackoff,
    ) -> Result<GetSnapshotTaskResult> {
        let last: Cell<Option<SnapshotStatus>> = Cell::new(None);
        let outcome: std::result::Result<_, PollError<SnapshotError>> =
            poll_until("wait_for_snapshot", policy, |_attempt| {
                let snapshot = self.get_snapshot(snapshot_id)?;
                if let Some(previous) = last.get() {
                    if !previous.can_advance_to(&snapshot.status) {
                        warn!(
                            snapshot_id = %snapshot_id,
                            from = %previous,
                            to = %snapshot.status,
                            "Snapshot status moved backwards"
                        );
                    }
                }
                last.set(Some(snapshot.status));
                if snapshot.status.is_terminal() {
                    Ok(PollState::Ready(snapshot))
                } else {
                    Ok(PollState::Pending(snapshot.status.to_string()))
                }
            });
        finish_wait(snapshot_id, outcome)
    }

    /// Poll `get-restore` until the restore reaches a terminal status
    pub fn wait_for_restore(
        &self,
        restore_id: u64,
        policy: ExponentialBackoff,
    ) -> Result<GetRestoreTaskResult> {
        let last: Cell<Option<RestoreStatus>> = Cell::new(None);
        let outcome: std::result::Result<_, PollError<SnapshotError>> =
            poll_until("wait_for_restore", policy, |_attempt| {
                let restore = self.get_restore(restore_id)?;
                if let Some(previous) = last.get() {
                    if !previous.can_advance_to(&restore.status) {
                        warn!(
                            restore_id,
                            from = %previous,
                            to = %restore.status,
                            "Restore status moved backwards"
                        );
                    }
                }
                last.set(Some(restore.status));
                if restore.status.is_terminal() {
                    Ok(PollState::Ready(restore))
                } else {
                    Ok(PollState::Pending(restore.status.to_string()))
                }
            });
        finish_wait(&restore_id.to_string(), outcome)
    }
}

fn finish_wait<T>(id: &str, outcome: std::result::Result<T, PollError<SnapshotError>>) -> Result<T> {
    match outcome {
        Ok(value) => Ok(value),
        Err(PollError::Failed { source, .. }) => Err(source),
        Err(PollError::TimedOut {
            attempts,
            last_status,
            ..
        }) => Err(SnapshotError::validation(format!(
            "{id} still {last_status} after {attempts} status checks"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::MockTaskInvoker;
    use mockall::predicate::{always, eq};
    use snapshot_poll::ExponentialBackoffBuilder;
    use std::time::Duration;

    fn quick_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(2))
            .with_max_elapsed_time(Some(Duration::from_millis(200)))
            .build()
    }

    fn snapshot_body(status: &str) -> String {
        format!(
            r#"{{"snapshotId": "snap", "snapshotDate": "2024-03-01T12:00:00Z", "status": "{status}",
                "sourceHost": "dc-host", "sourceStoreId": "0", "sourceSpaceId": "photos",
                "description": "nightly"}}"#
        )
    }

    #[test]
    fn test_create_snapshot_invokes_named_task() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .withf(|task, params| {
                let json: serde_json::Value = serde_json::from_str(params).unwrap();
                task == "create-snapshot"
                    && json["spaceId"] == "photos"
                    && json["snapshotProperties"]["description"] == "nightly"
            })
            .times(1)
            .returning(|_, _| Ok(r#"{"snapshotId": "snap"}"#.to_string()));

        let client = SnapshotTaskClient::new(invoker);
        let result = client.create_snapshot("photos", "nightly", None).unwrap();
        assert_eq!(result.snapshot_id, "snap");
    }

    #[test]
    fn test_invocation_failure_is_wrapped() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .with(eq("complete-snapshot"), always())
            .returning(|_, _| Err(SnapshotError::storage("acl write denied")));

        let err = SnapshotTaskClient::new(invoker)
            .complete_snapshot("photos")
            .unwrap_err();
        match &err {
            SnapshotError::TaskInvocation { task, source } => {
                assert_eq!(task, "complete-snapshot");
                assert!(matches!(**source, SnapshotError::StorageAccess(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), SnapshotError::StorageAccess(_)));
    }

    #[test]
    fn test_malformed_result_is_not_an_invocation_error() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .returning(|_, _| Ok(r#"{"unexpected": true}"#.to_string()));

        let err = SnapshotTaskClient::new(invoker)
            .get_snapshot("snap")
            .unwrap_err();
        assert!(matches!(err, SnapshotError::MalformedPayload { .. }));
    }

    #[test]
    fn test_contents_paging_checked_locally() {
        let mut invoker = MockTaskInvoker::new();
        invoker.expect_perform_task().never();
        let client = SnapshotTaskClient::new(invoker);

        for (page, size) in [(-1, 10), (0, 0), (0, 1001)] {
            assert!(matches!(
                client.get_snapshot_contents("snap", page, size, None),
                Err(SnapshotError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_contents_request() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .withf(|task, params| {
                let json: serde_json::Value = serde_json::from_str(params).unwrap();
                task == "get-snapshot-contents"
                    && json["pageNumber"] == 2
                    && json["pageSize"] == 1000
                    && json["prefix"] == "img/"
            })
            .returning(|_, _| Ok(r#"{"contentItems": [], "totalCount": 0}"#.to_string()));

        let result = SnapshotTaskClient::new(invoker)
            .get_snapshot_contents("snap", 2, 1000, Some("img/"))
            .unwrap();
        assert!(result.content_items.is_empty());
    }

    #[test]
    fn test_get_restore_by_snapshot() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .withf(|task, params| task == "get-restore" && params == r#"{"snapshotId":"snap"}"#)
            .returning(|_, _| {
                Ok(r#"{"restoreId": "9", "snapshotId": "snap", "status": "RESTORATION_COMPLETE",
                       "startDate": "2024-03-01T12:00:00Z", "destinationHost": "h",
                       "destinationPort": "443", "destinationStoreId": "0",
                       "destinationSpaceId": "restore-9"}"#
                    .to_string())
            });

        let restore = SnapshotTaskClient::new(invoker)
            .get_restore_by_snapshot("snap")
            .unwrap();
        assert_eq!(restore.restore_id, 9);
        assert!(restore.status.is_complete());
    }

    #[test]
    fn test_wait_for_snapshot_until_terminal() {
        let mut invoker = MockTaskInvoker::new();
        let mut seq = mockall::Sequence::new();
        for status in ["INITIALIZED", "TRANSFERRING_FROM_STORE", "SNAPSHOT_COMPLETE"] {
            let body = snapshot_body(status);
            invoker
                .expect_perform_task()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| Ok(body.clone()));
        }

        let snapshot = SnapshotTaskClient::new(invoker)
            .wait_for_snapshot("snap", quick_policy())
            .unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::SnapshotComplete);
    }

    #[test]
    fn test_wait_for_snapshot_stops_on_error() {
        let mut invoker = MockTaskInvoker::new();
        invoker
            .expect_perform_task()
            .times(1)
            .returning(|_, _| Err(SnapshotError::bridge("connection refused")));

        let err = SnapshotTaskClient::new(invoker)
            .wait_for_snapshot("snap", quick_policy())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::TaskInvocation { .. }));
        assert!(err.is_retryable());
    }
}
