/*!
In-memory storage provider.

Keeps spaces, their ACL lists and content objects in a map behind a mutex.
Useful for tests and for embedding the task handlers without a storage
service.
*/

use super::{validate_object_id, StorageProvider};
use crate::acl::SpaceAcls;
use crate::{Result, SnapshotError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A stored content object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub content_type: String,
    pub checksum: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Space {
    acls: SpaceAcls,
    contents: BTreeMap<String, StoredContent>,
}

/// Memory-based storage provider
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    spaces: Mutex<HashMap<String, Space>>,
    fail_content_writes: AtomicBool,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a space holding the given ACL list
    pub fn with_space(self, space_id: &str, acls: SpaceAcls) -> Self {
        if let Ok(mut spaces) = self.spaces.lock() {
            spaces.insert(
                space_id.to_string(),
                Space {
                    acls,
                    contents: BTreeMap::new(),
                },
            );
        }
        self
    }

    /// Make every following `add_content` call fail with a storage error
    pub fn fail_content_writes(&self, fail: bool) {
        self.fail_content_writes.store(fail, Ordering::SeqCst);
    }

    /// Inspect a stored object without going through the provider API
    pub fn content(&self, space_id: &str, content_id: &str) -> Option<StoredContent> {
        let spaces = self.spaces.lock().ok()?;
        spaces.get(space_id)?.contents.get(content_id).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Space>>> {
        self.spaces
            .lock()
            .map_err(|e| SnapshotError::storage(format!("memory storage lock poisoned: {e}")))
    }
}

fn space_not_found(space_id: &str) -> SnapshotError {
    SnapshotError::not_found(format!("space {space_id}"))
}

impl StorageProvider for MemoryStorageProvider {
    fn get_space_acls(&self, space_id: &str) -> Result<SpaceAcls> {
        let spaces = self.lock()?;
        spaces
            .get(space_id)
            .map(|space| space.acls.clone())
            .ok_or_else(|| space_not_found(space_id))
    }

    fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> Result<()> {
        let mut spaces = self.lock()?;
        let space = spaces
            .get_mut(space_id)
            .ok_or_else(|| space_not_found(space_id))?;
        space.acls = acls.clone();
        Ok(())
    }

    fn add_content(
        &self,
        space_id: &str,
        content_id: &str,
        content_type: &str,
        size: u64,
        checksum: &str,
        data: &[u8],
    ) -> Result<String> {
        validate_object_id("content", content_id)?;
        if self.fail_content_writes.load(Ordering::SeqCst) {
            return Err(SnapshotError::storage(format!(
                "write of {content_id} to {space_id} rejected"
            )));
        }
        if size != data.len() as u64 {
            return Err(SnapshotError::storage(format!(
                "declared size {size} does not match {} bytes received",
                data.len()
            )));
        }

        let mut spaces = self.lock()?;
        let space = spaces
            .get_mut(space_id)
            .ok_or_else(|| space_not_found(space_id))?;
        space.contents.insert(
            content_id.to_string(),
            StoredContent {
                content_type: content_type.to_string(),
                checksum: checksum.to_string(),
                data: data.to_vec(),
            },
        );
        Ok(checksum.to_string())
    }

    fn get_content(&self, space_id: &str, content_id: &str) -> Result<Vec<u8>> {
        let spaces = self.lock()?;
        let space = spaces.get(space_id).ok_or_else(|| space_not_found(space_id))?;
        space
            .contents
            .get(content_id)
            .map(|content| content.data.clone())
            .ok_or_else(|| SnapshotError::not_found(format!("content {space_id}/{content_id}")))
    }

    fn delete_content(&self, space_id: &str, content_id: &str) -> Result<()> {
        let mut spaces = self.lock()?;
        let space = spaces
            .get_mut(space_id)
            .ok_or_else(|| space_not_found(space_id))?;
        space.contents.remove(content_id);
        Ok(())
    }

    fn create_space(&self, space_id: &str) -> Result<()> {
        validate_object_id("space", space_id)?;
        let mut spaces = self.lock()?;
        if spaces.contains_key(space_id) {
            return Err(SnapshotError::storage(format!("space {space_id} already exists")));
        }
        spaces.insert(space_id.to_string(), Space::default());
        Ok(())
    }

    fn space_exists(&self, space_id: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(space_id))
    }
}
