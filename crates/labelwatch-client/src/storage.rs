// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! API key storage abstraction for the LabelWatch client.
//!
//! This module provides a trait-based abstraction for persisting the
//! annotation server API key, allowing different storage backends to be used
//! depending on the platform.
//!
//! # Storage Implementations
//!
//! - [`FileKeyStorage`]: Default file-based storage for desktop platforms
//! - [`MemoryKeyStorage`]: In-memory storage (no persistence)
//!
//! # Custom Storage
//!
//! Implement the [`KeyStorage`] trait to create custom storage backends,
//! such as an OS keychain or an encrypted preferences store.
//!
//! # Examples
//!
//! ```rust,no_run
//! use labelwatch_client::{Client, FileKeyStorage};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), labelwatch_client::Error> {
//! // Use default file storage (desktop platforms)
//! let client = Client::new("http://localhost:8080")?;
//!
//! // Use memory-only storage (no persistence)
//! let client = Client::new("http://localhost:8080")?.with_memory_storage();
//!
//! // Use custom file path
//! let storage = FileKeyStorage::with_path("/custom/path/api-key".into());
//! let client = Client::new("http://localhost:8080")?.with_storage(Arc::new(storage));
//! # Ok(())
//! # }
//! ```

use directories::ProjectDirs;
use log::debug;
use std::{path::PathBuf, sync::RwLock};

/// Error type for API key storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Storage is not available (e.g., cannot determine config directory).
    NotAvailable(String),
    /// Failed to read the key from storage.
    ReadError(String),
    /// Failed to write the key to storage.
    WriteError(String),
    /// Failed to clear the key from storage.
    ClearError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotAvailable(msg) => write!(f, "Key storage not available: {}", msg),
            StorageError::ReadError(msg) => write!(f, "Failed to read API key: {}", msg),
            StorageError::WriteError(msg) => write!(f, "Failed to write API key: {}", msg),
            StorageError::ClearError(msg) => write!(f, "Failed to clear API key: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Trait for persistent API key storage.
///
/// Implement this trait to create custom storage backends for the annotation
/// server API key. The storage must be thread-safe (`Send + Sync`).
pub trait KeyStorage: Send + Sync {
    /// Store the API key.
    fn store(&self, key: &str) -> Result<(), StorageError>;

    /// Load the stored API key.
    ///
    /// Returns `Ok(None)` if no key is stored.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Clear the stored API key.
    fn clear(&self) -> Result<(), StorageError>;
}

/// File-based API key storage for desktop platforms.
///
/// Stores the API key in a file on the local filesystem. By default, uses the
/// platform-specific config directory
/// (e.g., `~/.config/LabelWatch/api-key` on Linux).
#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    path: PathBuf,
}

impl FileKeyStorage {
    /// Create a new `FileKeyStorage` using the default platform config
    /// directory.
    pub fn new() -> Result<Self, StorageError> {
        let path = ProjectDirs::from("ai", "EdgeFirst", "LabelWatch")
            .ok_or_else(|| {
                StorageError::NotAvailable("Could not determine user config directory".to_string())
            })?
            .config_dir()
            .join("api-key");

        debug!("FileKeyStorage using default path: {:?}", path);
        Ok(Self { path })
    }

    /// Create a new `FileKeyStorage` with a custom file path.
    pub fn with_path(path: PathBuf) -> Self {
        debug!("FileKeyStorage using custom path: {:?}", path);
        Self { path }
    }

    /// Returns the path where the key is stored.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl KeyStorage for FileKeyStorage {
    fn store(&self, key: &str) -> Result<(), StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::WriteError(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        std::fs::write(&self.path, key).map_err(|e| {
            StorageError::WriteError(format!("Failed to write key to {:?}: {}", self.path, e))
        })?;

        debug!("API key stored to {:?}", self.path);
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        if !self.path.exists() {
            debug!("No API key file found at {:?}", self.path);
            return Ok(None);
        }

        let key = std::fs::read_to_string(&self.path).map_err(|e| {
            StorageError::ReadError(format!("Failed to read key from {:?}: {}", self.path, e))
        })?;

        if key.is_empty() {
            debug!("API key file at {:?} is empty", self.path);
            return Ok(None);
        }

        debug!("API key loaded from {:?}", self.path);
        Ok(Some(key))
    }

    fn clear(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                StorageError::ClearError(format!(
                    "Failed to remove key file {:?}: {}",
                    self.path, e
                ))
            })?;
            debug!("API key file removed from {:?}", self.path);
        }
        Ok(())
    }
}

/// In-memory API key storage (no persistence).
///
/// Stores the API key in memory only. The key is lost when the application
/// exits. This is useful for:
///
/// - Testing
/// - Platforms that use custom secure storage
/// - Applications that don't need key persistence
///
/// # Examples
///
/// ```rust
/// use labelwatch_client::{KeyStorage, MemoryKeyStorage};
///
/// let storage = MemoryKeyStorage::new();
/// storage.store("my-key").unwrap();
/// assert_eq!(storage.load().unwrap(), Some("my-key".to_string()));
/// storage.clear().unwrap();
/// assert_eq!(storage.load().unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    key: RwLock<Option<String>>,
}

impl MemoryKeyStorage {
    /// Create a new `MemoryKeyStorage`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn store(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.key.write().map_err(|e| {
            StorageError::WriteError(format!("Failed to acquire write lock: {}", e))
        })?;
        *guard = Some(key.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .key
            .read()
            .map_err(|e| StorageError::ReadError(format!("Failed to acquire read lock: {}", e)))?;
        Ok(guard.clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.key.write().map_err(|e| {
            StorageError::ClearError(format!("Failed to acquire write lock: {}", e))
        })?;
        *guard = None;
        Ok(())
    }
}
