/*!
Per-space exclusive leases.

A lease is held while a snapshot of a space is being set up, so two
`create-snapshot` calls on the same space through one dispatcher cannot
interleave their ACL and property writes. The lease lives only in this
process; it does not replace the ACL downgrade that keeps other writers out.
*/

use crate::{Result, SnapshotError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct SpaceLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Releases its space when dropped
#[derive(Debug)]
pub struct SpaceLease {
    space_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl SpaceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease on `space_id`, failing with [`SnapshotError::SpaceBusy`] if it is held
    pub fn acquire(&self, space_id: &str) -> Result<SpaceLease> {
        let mut held = self
            .held
            .lock()
            .map_err(|e| SnapshotError::storage(format!("space lease table poisoned: {e}")))?;
        if !held.insert(space_id.to_string()) {
            return Err(SnapshotError::SpaceBusy {
                space_id: space_id.to_string(),
            });
        }
        debug!(space_id = %space_id, "Space lease acquired");
        Ok(SpaceLease {
            space_id: space_id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, space_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(space_id))
            .unwrap_or(false)
    }
}

impl SpaceLease {
    pub fn space_id(&self) -> &str {
        &self.space_id
    }
}

impl Drop for SpaceLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.space_id);
        }
        debug!(space_id = %self.space_id, "Space lease released");
    }
}
