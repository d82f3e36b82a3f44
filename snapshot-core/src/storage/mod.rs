/*!
Storage provider port.

The snapshot handlers never read or write content themselves. They reach the
object-storage layer only through [`StorageProvider`], which exposes the few
operations the snapshot and restore flows need: space ACLs, single content
objects, and space creation.
*/

pub mod local;
pub mod memory;

use crate::acl::SpaceAcls;
use crate::Result;

/// The slice of the object-storage API used by the snapshot task handlers
///
/// Implementations must be `Send + Sync`; the dispatcher shares one provider
/// across concurrent task calls.
#[cfg_attr(test, mockall::automock)]
pub trait StorageProvider: Send + Sync {
    /// Full ACL list of a space
    fn get_space_acls(&self, space_id: &str) -> Result<SpaceAcls>;

    /// Replace the full ACL list of a space in one call
    fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> Result<()>;

    /// Store a content object, overwriting any object with the same id
    ///
    /// # Returns
    /// The checksum recorded by the storage layer
    fn add_content(
        &self,
        space_id: &str,
        content_id: &str,
        content_type: &str,
        size: u64,
        checksum: &str,
        data: &[u8],
    ) -> Result<String>;

    /// Read a content object
    fn get_content(&self, space_id: &str, content_id: &str) -> Result<Vec<u8>>;

    /// Delete a content object; deleting a missing object is not an error
    fn delete_content(&self, space_id: &str, content_id: &str) -> Result<()>;

    /// Create an empty space with an empty ACL list
    fn create_space(&self, space_id: &str) -> Result<()>;

    fn space_exists(&self, space_id: &str) -> Result<bool>;
}

/// Reject ids that could escape a storage root or collide with bookkeeping
pub(crate) fn validate_object_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty()
        || id.starts_with('/')
        || id.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(crate::SnapshotError::storage(format!("invalid {kind} id '{id}'")));
    }
    Ok(())
}

pub use local::LocalSpaceStorage;
pub use memory::MemoryStorageProvider;
