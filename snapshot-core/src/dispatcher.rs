/*!
Named-task dispatch.

[`TaskDispatcher`] is the generic task extension point: it takes a task name
and a JSON parameter string, resolves the name against the closed
[`TaskName`] set once, and hands the call to the registered [`TaskRunner`].
Unknown names are rejected before any handler runs.
*/

use crate::bridge::BridgeGateway;
use crate::config::SnapshotConfig;
use crate::storage::StorageProvider;
use crate::task::{RestoreTaskHandler, SnapshotTaskHandler, TaskName};
use crate::{Result, SnapshotError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::observability::TaskTimer;

/// A handler serving a subset of the task names
pub trait TaskRunner: Send + Sync {
    fn supported_tasks(&self) -> &[TaskName];

    fn perform_task(&self, task: TaskName, params: &str) -> Result<String>;
}

/// The string-level task extension point, as seen by callers
#[cfg_attr(test, mockall::automock)]
pub trait TaskInvoker: Send + Sync {
    fn perform_task(&self, task_name: &str, params: &str) -> Result<String>;
}

/// Host lifecycle of the task service
pub trait ServiceLifecycle {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn report_status(&self) -> ServiceStatus;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub tasks: Vec<TaskName>,
    pub completed: u64,
    pub failed: u64,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} tasks, {} completed, {} failed)",
            if self.running { "running" } else { "stopped" },
            self.tasks.len(),
            self.completed,
            self.failed
        )
    }
}

/// Routes named tasks to their runners
pub struct TaskDispatcher {
    runners: HashMap<TaskName, Arc<dyn TaskRunner>>,
    running: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl TaskDispatcher {
    /// An empty, running dispatcher
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
            running: AtomicBool::new(true),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Dispatcher serving every task with the snapshot and restore handlers
    pub fn with_handlers(
        provider: Arc<dyn StorageProvider>,
        bridge: Arc<dyn BridgeGateway>,
        config: &SnapshotConfig,
    ) -> Self {
        let snapshots = SnapshotTaskHandler::new(Arc::clone(&provider), Arc::clone(&bridge), config);
        let restores = RestoreTaskHandler::new(provider, bridge, config);

        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(snapshots));
        dispatcher.register(Arc::new(restores));
        dispatcher
    }

    /// Register `runner` for every task it supports, replacing earlier runners
    pub fn register(&mut self, runner: Arc<dyn TaskRunner>) {
        for task in runner.supported_tasks() {
            self.runners.insert(*task, Arc::clone(&runner));
        }
    }

    pub fn supported_tasks(&self) -> Vec<TaskName> {
        TaskName::ALL
            .iter()
            .copied()
            .filter(|task| self.runners.contains_key(task))
            .collect()
    }

    /// Dispatch a task whose name is already resolved
    pub fn dispatch(&self, task: TaskName, params: &str) -> Result<String> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SnapshotError::storage("task service is stopped"));
        }
        let runner = self
            .runners
            .get(&task)
            .ok_or_else(|| SnapshotError::UnknownTask(task.to_string()))?;

        let span = info_span!(
            "task",
            task = %task,
            mutating = task.is_mutating(),
            request_id = %Uuid::new_v4()
        );
        let _guard = span.enter();

        #[cfg(feature = "metrics")]
        let timer = TaskTimer::start(task);

        let started = Instant::now();
        let result = runner.perform_task(task, params);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(elapsed_ms, "Task completed");
                #[cfg(feature = "metrics")]
                timer.finish();
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(elapsed_ms, error = %e, "Task failed");
                #[cfg(feature = "metrics")]
                timer.finish_with_error();
            }
        }
        result
    }
}

impl Default for TaskDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskInvoker for TaskDispatcher {
    fn perform_task(&self, task_name: &str, params: &str) -> Result<String> {
        let task: TaskName = task_name.parse()?;
        self.dispatch(task, params)
    }
}

impl<T: TaskInvoker + ?Sized> TaskInvoker for Arc<T> {
    fn perform_task(&self, task_name: &str, params: &str) -> Result<String> {
        (**self).perform_task(task_name, params)
    }
}

impl ServiceLifecycle for TaskDispatcher {
    fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(tasks = self.runners.len(), "Task service started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Task service stopped");
        Ok(())
    }

    fn report_status(&self) -> ServiceStatus {
        ServiceStatus {
            running: self.running.load(Ordering::SeqCst),
            tasks: self.supported_tasks(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Echoes its parameters and remembers which tasks it saw
    struct EchoRunner {
        tasks: Vec<TaskName>,
        seen: Mutex<Vec<TaskName>>,
    }

    impl TaskRunner for EchoRunner {
        fn supported_tasks(&self) -> &[TaskName] {
            &self.tasks
        }

        fn perform_task(&self, task: TaskName, params: &str) -> Result<String> {
            self.seen.lock().unwrap().push(task);
            if params == "fail" {
                return Err(SnapshotError::bridge("down"));
            }
            Ok(params.to_string())
        }
    }

    fn dispatcher() -> (TaskDispatcher, Arc<EchoRunner>) {
        let runner = Arc::new(EchoRunner {
            tasks: vec![TaskName::GetSnapshot, TaskName::GetRestore],
            seen: Mutex::new(Vec::new()),
        });
        let mut dispatcher = TaskDispatcher::new();
        dispatcher.register(runner.clone());
        (dispatcher, runner)
    }

    #[test]
    fn test_dispatch_by_name() {
        let (dispatcher, runner) = dispatcher();
        assert_eq!(dispatcher.perform_task("get-snapshot", "{}").unwrap(), "{}");
        assert_eq!(*runner.seen.lock().unwrap(), vec![TaskName::GetSnapshot]);
    }

    #[test]
    fn test_unknown_task_rejected_before_handler() {
        let (dispatcher, runner) = dispatcher();
        assert!(matches!(
            dispatcher.perform_task("delete-everything", "{}"),
            Err(SnapshotError::UnknownTask(_))
        ));
        assert!(matches!(
            dispatcher.perform_task("create-snapshot", "{}"),
            Err(SnapshotError::UnknownTask(_))
        ));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lifecycle() {
        let (dispatcher, runner) = dispatcher();
        dispatcher.stop().unwrap();

        let err = dispatcher.perform_task("get-snapshot", "{}").unwrap_err();
        assert_eq!(err.to_string(), "Storage access failure: task service is stopped");
        assert!(runner.seen.lock().unwrap().is_empty());
        assert!(!dispatcher.report_status().running);

        dispatcher.start().unwrap();
        dispatcher.perform_task("get-restore", "{}").unwrap();
        dispatcher.perform_task("get-restore", "fail").unwrap_err();

        let status = dispatcher.report_status();
        assert!(status.running);
        assert_eq!(status.tasks, vec![TaskName::GetSnapshot, TaskName::GetRestore]);
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.to_string(), "running (2 tasks, 1 completed, 1 failed)");
    }
}
