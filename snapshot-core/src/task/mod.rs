/*!
Snapshot and restore tasks.

Every task reachable through the generic task extension point is named by a
[`TaskName`]. The name is parsed once at the dispatch boundary; unknown names
are rejected there, before any handler runs.
*/

pub mod params;
pub mod restore;
pub mod results;
pub mod snapshot;
pub mod status;

use crate::SnapshotError;
use std::fmt;
use std::str::FromStr;

pub use params::*;
pub use restore::RestoreTaskHandler;
pub use results::*;
pub use snapshot::SnapshotTaskHandler;
pub use status::{RestoreStatus, SnapshotStatus};

/// The closed set of tasks served by the snapshot task handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    CreateSnapshot,
    CompleteSnapshot,
    GetSnapshots,
    GetSnapshot,
    GetSnapshotContents,
    RestoreSnapshot,
    GetRestore,
}

impl TaskName {
    /// Every supported task, in registration order
    pub const ALL: [TaskName; 7] = [
        TaskName::CreateSnapshot,
        TaskName::CompleteSnapshot,
        TaskName::GetSnapshots,
        TaskName::GetSnapshot,
        TaskName::GetSnapshotContents,
        TaskName::RestoreSnapshot,
        TaskName::GetRestore,
    ];

    /// The exact wire name of the task
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::CreateSnapshot => "create-snapshot",
            TaskName::CompleteSnapshot => "complete-snapshot",
            TaskName::GetSnapshots => "get-snapshots",
            TaskName::GetSnapshot => "get-snapshot",
            TaskName::GetSnapshotContents => "get-snapshot-contents",
            TaskName::RestoreSnapshot => "restore-snapshot",
            TaskName::GetRestore => "get-restore",
        }
    }

    /// Whether handling the task changes state in storage or at the bridge
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            TaskName::CreateSnapshot | TaskName::CompleteSnapshot | TaskName::RestoreSnapshot
        )
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SnapshotError::UnknownTask(s.to_string()))
    }
}
