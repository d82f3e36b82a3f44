/*!
Local filesystem storage provider.
*/

use super::{validate_object_id, StorageProvider};
use crate::acl::SpaceAcls;
use crate::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the base dir holding one record file per space
const SPACE_RECORD_DIR: &str = ".spaces";

#[derive(Serialize, Deserialize, Debug, Default)]
struct ContentRecord {
    content_type: String,
    checksum: String,
    size: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct SpaceRecord {
    acls: SpaceAcls,
    contents: BTreeMap<String, ContentRecord>,
}

/// Local filesystem storage provider
///
/// Each space is a directory under the base directory and each content
/// object a file inside it. ACLs and content metadata live in a JSON record
/// per space under `.spaces/`.
///
/// # Example
/// ```rust,no_run
/// use snapshot_core::storage::{LocalSpaceStorage, StorageProvider};
///
/// let storage = LocalSpaceStorage::new("/var/lib/snapctl/store");
/// storage.create_space("photos")?;
/// # Ok::<(), snapshot_core::SnapshotError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalSpaceStorage {
    base_dir: PathBuf,
}

impl LocalSpaceStorage {
    /// Create a provider rooted at `base_dir`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, space_id: &str) -> PathBuf {
        self.base_dir
            .join(SPACE_RECORD_DIR)
            .join(format!("{space_id}.json"))
    }

    fn content_path(&self, space_id: &str, content_id: &str) -> PathBuf {
        self.base_dir.join(space_id).join(content_id)
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SnapshotError::storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn load_record(&self, space_id: &str) -> Result<SpaceRecord> {
        validate_object_id("space", space_id)?;
        let path = self.record_path(space_id);
        if !path.exists() {
            return Err(SnapshotError::not_found(format!("space {space_id}")));
        }
        let text = fs::read_to_string(&path).map_err(|e| {
            SnapshotError::storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SnapshotError::storage(format!("Corrupt space record {}: {}", path.display(), e))
        })
    }

    fn save_record(&self, space_id: &str, record: &SpaceRecord) -> Result<()> {
        let path = self.record_path(space_id);
        self.ensure_parent_dir(&path)?;
        let text = serde_json::to_string_pretty(record)?;
        fs::write(&path, text).map_err(|e| {
            SnapshotError::storage(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

impl StorageProvider for LocalSpaceStorage {
    fn get_space_acls(&self, space_id: &str) -> Result<SpaceAcls> {
        Ok(self.load_record(space_id)?.acls)
    }

    fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> Result<()> {
        let mut record = self.load_record(space_id)?;
        record.acls = acls.clone();
        self.save_record(space_id, &record)
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
        let mut record = self.load_record(space_id)?;
        if size != data.len() as u64 {
            return Err(SnapshotError::storage(format!(
                "declared size {size} does not match {} bytes received",
                data.len()
            )));
        }

        let full_path = self.content_path(space_id, content_id);
        self.ensure_parent_dir(&full_path)?;
        fs::write(&full_path, data).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to write content to {}: {}",
                full_path.display(),
                e
            ))
        })?;

        record.contents.insert(
            content_id.to_string(),
            ContentRecord {
                content_type: content_type.to_string(),
                checksum: checksum.to_string(),
                size,
            },
        );
        self.save_record(space_id, &record)?;
        debug!(space_id = %space_id, content_id = %content_id, size, "Content stored");
        Ok(checksum.to_string())
    }

    fn get_content(&self, space_id: &str, content_id: &str) -> Result<Vec<u8>> {
        validate_object_id("content", content_id)?;
        let record = self.load_record(space_id)?;
        if !record.contents.contains_key(content_id) {
            return Err(SnapshotError::not_found(format!(
                "content {space_id}/{content_id}"
            )));
        }

        let full_path = self.content_path(space_id, content_id);
        fs::read(&full_path).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to read content from {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn delete_content(&self, space_id: &str, content_id: &str) -> Result<()> {
        validate_object_id("content", content_id)?;
        let mut record = self.load_record(space_id)?;
        let full_path = self.content_path(space_id, content_id);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                SnapshotError::storage(format!(
                    "Failed to delete content {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }
        if record.contents.remove(content_id).is_some() {
            self.save_record(space_id, &record)?;
        }
        Ok(())
    }

    fn create_space(&self, space_id: &str) -> Result<()> {
        validate_object_id("space", space_id)?;
        if self.record_path(space_id).exists() {
            return Err(SnapshotError::storage(format!("space {space_id} already exists")));
        }
        fs::create_dir_all(self.base_dir.join(space_id))?;
        self.save_record(space_id, &SpaceRecord::default())
    }

    fn space_exists(&self, space_id: &str) -> Result<bool> {
        validate_object_id("space", space_id)?;
        Ok(self.record_path(space_id).exists())
    }
}
