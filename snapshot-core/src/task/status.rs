/*!
Job status tags reported by the bridge.

The bridge is the authority for status. These enums only relay what it
reports; the ordering lets a poller notice a status that moved backwards and
the `is_complete` predicate tells it when post-processing may start.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of a snapshot transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    Initialized,
    TransferringFromStore,
    WaitingForArchive,
    CleaningUp,
    SnapshotComplete,
    FailedToTransfer,
}

impl SnapshotStatus {
    /// Position in the progression; failure ranks after every live state
    pub fn rank(&self) -> u8 {
        match self {
            Self::Initialized => 0,
            Self::TransferringFromStore => 1,
            Self::WaitingForArchive => 2,
            Self::CleaningUp => 3,
            Self::SnapshotComplete => 4,
            Self::FailedToTransfer => 5,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::SnapshotComplete)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SnapshotComplete | Self::FailedToTransfer)
    }

    /// Returns `true` if `next` does not move backwards from this status
    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::TransferringFromStore => "TRANSFERRING_FROM_STORE",
            Self::WaitingForArchive => "WAITING_FOR_ARCHIVE",
            Self::CleaningUp => "CLEANING_UP",
            Self::SnapshotComplete => "SNAPSHOT_COMPLETE",
            Self::FailedToTransfer => "FAILED_TO_TRANSFER",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a restore transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreStatus {
    Initialized,
    WaitingForArchive,
    ArchiveTransferComplete,
    TransferringToStore,
    TransferToStoreComplete,
    VerifyingTransferredContent,
    RestorationComplete,
    Error,
}

impl RestoreStatus {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Initialized => 0,
            Self::WaitingForArchive => 1,
            Self::ArchiveTransferComplete => 2,
            Self::TransferringToStore => 3,
            Self::TransferToStoreComplete => 4,
            Self::VerifyingTransferredContent => 5,
            Self::RestorationComplete => 6,
            Self::Error => 7,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::RestorationComplete)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RestorationComplete | Self::Error)
    }

    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::WaitingForArchive => "WAITING_FOR_ARCHIVE",
            Self::ArchiveTransferComplete => "ARCHIVE_TRANSFER_COMPLETE",
            Self::TransferringToStore => "TRANSFERRING_TO_STORE",
            Self::TransferToStoreComplete => "TRANSFER_TO_STORE_COMPLETE",
            Self::VerifyingTransferredContent => "VERIFYING_TRANSFERRED_CONTENT",
            Self::RestorationComplete => "RESTORATION_COMPLETE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_display() {
        let json = serde_json::to_string(&SnapshotStatus::TransferringFromStore).unwrap();
        assert_eq!(json, "\"TRANSFERRING_FROM_STORE\"");
        assert_eq!(
            SnapshotStatus::TransferringFromStore.to_string(),
            "TRANSFERRING_FROM_STORE"
        );

        let status: RestoreStatus = serde_json::from_str("\"VERIFYING_TRANSFERRED_CONTENT\"").unwrap();
        assert_eq!(status, RestoreStatus::VerifyingTransferredContent);
        assert_eq!(status.to_string(), "VERIFYING_TRANSFERRED_CONTENT");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(serde_json::from_str::<SnapshotStatus>("\"PAUSED\"").is_err());
    }

    #[test]
    fn test_progression_is_monotonic() {
        assert!(SnapshotStatus::Initialized.can_advance_to(&SnapshotStatus::WaitingForArchive));
        assert!(SnapshotStatus::CleaningUp.can_advance_to(&SnapshotStatus::CleaningUp));
        assert!(!SnapshotStatus::CleaningUp.can_advance_to(&SnapshotStatus::Initialized));
        assert!(!SnapshotStatus::SnapshotComplete.can_advance_to(&SnapshotStatus::FailedToTransfer));

        assert!(RestoreStatus::Initialized.can_advance_to(&RestoreStatus::Error));
        assert!(!RestoreStatus::TransferringToStore.can_advance_to(&RestoreStatus::WaitingForArchive));
        assert!(!RestoreStatus::Error.can_advance_to(&RestoreStatus::RestorationComplete));
    }

    #[test]
    fn test_complete_predicate() {
        assert!(SnapshotStatus::SnapshotComplete.is_complete());
        assert!(!SnapshotStatus::FailedToTransfer.is_complete());
        assert!(SnapshotStatus::FailedToTransfer.is_terminal());

        assert!(RestoreStatus::RestorationComplete.is_complete());
        assert!(!RestoreStatus::TransferToStoreComplete.is_complete());
        assert!(!RestoreStatus::TransferToStoreComplete.is_terminal());
    }
}
