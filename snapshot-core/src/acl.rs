/*!
Space access-control adjustments made around a snapshot.

While a snapshot is transferred the source space must not change. The lock is
expressed purely through the space ACL list: writers are downgraded to
readers and the snapshot principal is granted read access, so the storage
layer itself refuses writes. There is no lock inside this crate.

The read-modify-write against the storage provider is not guarded. Two
snapshot requests racing on one space can interleave their reads and writes;
[`crate::lease::SpaceLeases`] closes that window for requests that go through
the same dispatcher.
*/

use crate::constants::SPACE_ACL_PREFIX;
use crate::storage::StorageProvider;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Access level granted to a principal on a space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclType {
    Read,
    Write,
    None,
}

impl AclType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclType::Read => "READ",
            AclType::Write => "WRITE",
            AclType::None => "NONE",
        }
    }
}

impl fmt::Display for AclType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AclType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "READ" => Ok(AclType::Read),
            "WRITE" => Ok(AclType::Write),
            "NONE" => Ok(AclType::None),
            other => Err(format!("unknown ACL value '{other}'")),
        }
    }
}

/// Full ACL list of a space, keyed by principal
pub type SpaceAcls = BTreeMap<String, AclType>;

/// The reserved principal under which the bridge reads a space
pub fn snapshot_principal(snapshot_user: &str) -> String {
    format!("{SPACE_ACL_PREFIX}{snapshot_user}")
}

/// Compute the ACL list that freezes a space for a snapshot
///
/// Every principal other than `principal` holding WRITE drops to READ; READ
/// and NONE entries are kept as they are. `principal` is set to READ whether
/// or not it was present.
pub fn read_only_acls(current: &SpaceAcls, principal: &str) -> SpaceAcls {
    let mut acls: SpaceAcls = current
        .iter()
        .filter(|(name, _)| name.as_str() != principal)
        .map(|(name, acl)| {
            let acl = match acl {
                AclType::Write => AclType::Read,
                other => *other,
            };
            (name.clone(), acl)
        })
        .collect();
    acls.insert(principal.to_string(), AclType::Read);
    acls
}

/// Reads and rewrites space ACL lists on behalf of the snapshot handlers
pub struct AccessControlAdjuster<'a> {
    provider: &'a dyn StorageProvider,
}

impl<'a> AccessControlAdjuster<'a> {
    pub fn new(provider: &'a dyn StorageProvider) -> Self {
        Self { provider }
    }

    /// Make `space_id` read-only for everyone, granting READ to `principal`
    ///
    /// Returns the ACL list as it was before the change so it can be put
    /// back once the snapshot completes. The new list is written with a
    /// single call; a failed read writes nothing.
    pub fn make_read_only_for_snapshot(&self, space_id: &str, principal: &str) -> Result<SpaceAcls> {
        let original = self.provider.get_space_acls(space_id)?;
        let locked = read_only_acls(&original, principal);

        debug!(
            space_id = %space_id,
            entries = locked.len(),
            "Writing read-only ACL list"
        );
        self.provider.set_space_acls(space_id, &locked)?;

        info!(space_id = %space_id, principal = %principal, "Space locked for snapshot");
        Ok(original)
    }

    /// Put back an ACL list recorded by [`Self::make_read_only_for_snapshot`]
    pub fn restore_acls(&self, space_id: &str, original: &SpaceAcls) -> Result<()> {
        self.provider.set_space_acls(space_id, original)?;
        info!(space_id = %space_id, entries = original.len(), "Space ACLs restored");
        Ok(())
    }
}
