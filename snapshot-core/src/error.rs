/*!
Error types for the snapshot task core.
*/

use thiserror::Error;

/// Result type used throughout the snapshot task core.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur while dispatching or handling snapshot tasks.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Task parameters or results could not be parsed into their typed shape
    #[error("Malformed payload for task '{task}': {message}")]
    MalformedPayload { task: String, message: String },

    /// Reading or writing ACLs or content in the underlying storage failed
    #[error("Storage access failure: {0}")]
    StorageAccess(String),

    /// A storage object or space does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dispatch received a task name outside the supported set
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// The handoff to the bridge could not be delivered
    #[error("Bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Another snapshot of the same space is being created
    #[error("Space {space_id} already has a snapshot in progress")]
    SpaceBusy { space_id: String },

    /// Argument checks that fail before any task is dispatched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A task invocation failed; the cause is carried unchanged
    #[error("Task '{task}' failed: {source}")]
    TaskInvocation {
        task: String,
        #[source]
        source: Box<SnapshotError>,
    },

    /// I/O errors from local storage adapters
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors outside the task envelope (config files, side files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a new malformed payload error for the named task
    pub fn malformed<T: Into<String>, S: Into<String>>(task: T, msg: S) -> Self {
        Self::MalformedPayload {
            task: task.into(),
            message: msg.into(),
        }
    }

    /// Create a new storage access error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::StorageAccess(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new bridge unavailable error
    pub fn bridge<S: Into<String>>(msg: S) -> Self {
        Self::BridgeUnavailable(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a dispatch failure as seen by the task client
    pub fn invocation<S: Into<String>>(task: S, source: SnapshotError) -> Self {
        Self::TaskInvocation {
            task: task.into(),
            source: Box::new(source),
        }
    }

    /// Only a bridge that could not be reached is worth asking again later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BridgeUnavailable(_) => true,
            Self::TaskInvocation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The innermost error, looking through task invocation wrappers
    pub fn root_cause(&self) -> &SnapshotError {
        match self {
            Self::TaskInvocation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
