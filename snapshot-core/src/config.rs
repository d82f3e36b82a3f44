//! Configuration for the snapshot task service
//!
//! This module holds the identity of the storage instance whose spaces are
//! snapshotted, the bridge connection settings, the reserved snapshot user
//! and the storage backend selection.

use crate::storage::{LocalSpaceStorage, MemoryStorageProvider, StorageProvider};
use crate::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Enumeration of supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Directory per space on the local filesystem
    Local,
    /// Process-local in-memory spaces
    Memory,
}

/// Configuration structure for storage backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// The storage backend to use
    pub backend: StorageBackend,
    /// Base path for local storage (required for the local backend)
    #[serde(default)]
    pub local_base_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Create a configuration for local storage rooted at `base_path`
    pub fn local<P: AsRef<Path>>(base_path: P) -> Self {
        StorageConfig {
            backend: StorageBackend::Local,
            local_base_path: Some(base_path.as_ref().to_path_buf()),
        }
    }

    pub fn memory() -> Self {
        StorageConfig {
            backend: StorageBackend::Memory,
            local_base_path: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::Local => match &self.local_base_path {
                Some(path) if !path.as_os_str().is_empty() => Ok(()),
                _ => Err(SnapshotError::config(
                    "Local backend requires a base path",
                )),
            },
            StorageBackend::Memory => Ok(()),
        }
    }

    /// Build the storage provider this configuration selects
    pub fn build_provider(&self) -> Result<Arc<dyn StorageProvider>> {
        self.validate()?;
        match (self.backend, &self.local_base_path) {
            (StorageBackend::Local, Some(path)) => Ok(Arc::new(LocalSpaceStorage::new(path))),
            (StorageBackend::Local, None) => Err(SnapshotError::config(
                "Local backend requires a base path",
            )),
            (StorageBackend::Memory, _) => Ok(Arc::new(MemoryStorageProvider::new())),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// The storage instance whose spaces are snapshotted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInstance {
    pub host: String,
    pub port: String,
    pub store_id: String,
}

/// Connection settings of the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub host: String,
    pub port: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Complete configuration of a snapshot task service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub store: StoreInstance,
    /// User the bridge reads spaces as; granted READ while a snapshot runs
    pub snapshot_user: String,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SnapshotError::config(format!("{field} must not be empty")));
    }
    Ok(())
}

impl SnapshotConfig {
    /// Load a JSON configuration file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnapshotError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: SnapshotConfig = serde_json::from_str(&text).map_err(|e| {
            SnapshotError::config(format!("Invalid configuration {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        require("store.host", &self.store.host)?;
        require("store.port", &self.store.port)?;
        require("store.storeId", &self.store.store_id)?;
        require("snapshotUser", &self.snapshot_user)?;
        require("bridge.host", &self.bridge.host)?;
        require("bridge.port", &self.bridge.port)?;
        self.storage.validate()
    }
}
