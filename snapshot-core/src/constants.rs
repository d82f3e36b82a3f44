//! Wire-level constants shared by the handlers and the task client.

/// Content id under which snapshot properties are stored inside the source space
pub const SNAPSHOT_PROPS_CONTENT_ID: &str = ".collection-snapshot.properties";

/// Media type of the snapshot properties content object
pub const SNAPSHOT_PROPS_CONTENT_TYPE: &str = "text/x-java-properties";

/// Prefix that marks a space ACL principal in space properties
pub const SPACE_ACL_PREFIX: &str = "acl-";

/// Key prefix used to record the pre-snapshot ACL list in snapshot properties
pub const ORIGINAL_ACL_PROP_PREFIX: &str = "space-acl.";

/// Snapshot property holding the human-readable description
pub const DESCRIPTION_PROP: &str = "description";

/// Snapshot property holding the requester's email address
pub const USER_EMAIL_PROP: &str = "user-email";

/// Snapshot property holding the space the snapshot was taken from
pub const SPACE_ID_PROP: &str = "space-id";

pub const DEFAULT_CONTENT_PAGE_NUMBER: i64 = 0;
pub const MIN_CONTENT_PAGE_SIZE: i64 = 1;
pub const MAX_CONTENT_PAGE_SIZE: i64 = 1000;

/// Timestamp layout embedded in generated snapshot ids
pub const SNAPSHOT_ID_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Snapshot property holding the id allocated for the snapshot
pub const SNAPSHOT_ID_PROP: &str = "snapshot-id";

/// Prefix of the landing space a restore is written into
pub const RESTORE_SPACE_PREFIX: &str = "restore-";

/// Snapshot property set to `failed` when the bridge never accepted the snapshot
pub const BRIDGE_HANDOFF_PROP: &str = "bridge-handoff";

pub const BRIDGE_HANDOFF_FAILED: &str = "failed";
