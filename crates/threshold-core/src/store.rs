//! Remote config store contract
//!
//! The patch cycle reads the embedded document through [`ConfigStore::fetch`]
//! and writes it back with [`ConfigStore::patch_field`], a merge patch that
//! replaces only the one embedded field. Stores perform no locking. A caller
//! that wants lost updates detected passes the version it fetched; stores
//! then refuse to overwrite a newer document.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::StoreError;

pub use async_trait::async_trait;

/// The embedded field as fetched, with an opaque version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub raw: String,
    pub version: Option<String>,
}

/// Read and merge-patch one embedded field of a remote object
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the current field contents. Missing or empty fields are errors.
    async fn fetch(&self) -> Result<FetchedDocument, StoreError>;

    /// Replace the field, leaving sibling fields untouched
    ///
    /// With `expected_version`, a write against a changed object fails with
    /// [`StoreError::Conflict`].
    async fn patch_field(
        &self,
        new_raw: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Human-readable location, used in logs and messages
    fn describe(&self) -> String;
}

/// Merge-patch body replacing `data.<key>`, optionally pinned to a resource version
pub fn field_patch(key: &str, new_raw: &str, resource_version: Option<&str>) -> Value {
    let mut patch = json!({ "data": { key: new_raw } });
    if let Some(version) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": version });
    }
    patch
}

/// Apply a JSON merge patch (RFC 7386) to `target`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// In-process host object shaped like a ConfigMap
///
/// Writes go through [`merge_patch`] and bump `metadata.resourceVersion`.
#[derive(Debug)]
pub struct MemoryStore {
    key: String,
    state: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    object: Value,
    writes: usize,
    reject_writes: Option<String>,
}

impl MemoryStore {
    /// A host object with just `data.<key> = raw`
    pub fn new(key: impl Into<String>, raw: impl Into<String>) -> Self {
        let key = key.into();
        let raw: String = raw.into();
        let object = json!({
            "metadata": { "resourceVersion": "1" },
            "data": { key.as_str(): raw },
        });
        Self::from_object(key, object)
    }

    /// Wrap an arbitrary host object; the field lives at `data.<key>`
    pub fn from_object(key: impl Into<String>, object: Value) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(MemoryState {
                object,
                writes: 0,
                reject_writes: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the whole host object
    pub fn object(&self) -> Value {
        self.lock().object.clone()
    }

    /// Number of accepted writes
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Make every following write fail with `reason`
    pub fn reject_writes(&self, reason: impl Into<String>) {
        self.lock().reject_writes = Some(reason.into());
    }

    /// Replace the field out of band, as a concurrent writer would
    pub fn overwrite_field(&self, raw: &str) {
        let mut state = self.lock();
        merge_patch(&mut state.object, &field_patch(&self.key, raw, None));
        bump_version(&mut state.object);
    }
}

fn resource_version(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn bump_version(object: &mut Value) {
    let next = resource_version(object)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(1, |v| v + 1);
    merge_patch(
        object,
        &json!({ "metadata": { "resourceVersion": next.to_string() } }),
    );
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn fetch(&self) -> Result<FetchedDocument, StoreError> {
        let state = self.lock();
        let raw = state
            .object
            .get("data")
            .and_then(|data| data.get(&self.key))
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::fetch(format!("field `{}` not found", self.key)))?;

        if raw.is_empty() {
            return Err(StoreError::fetch(format!("field `{}` is empty", self.key)));
        }

        Ok(FetchedDocument {
            raw: raw.to_string(),
            version: resource_version(&state.object),
        })
    }

    async fn patch_field(
        &self,
        new_raw: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();

        if let Some(reason) = &state.reject_writes {
            return Err(StoreError::patch(reason.clone()));
        }

        if let Some(expected) = expected_version {
            if resource_version(&state.object).as_deref() != Some(expected) {
                return Err(StoreError::Conflict {
                    expected: expected.to_string(),
                });
            }
        }

        merge_patch(&mut state.object, &field_patch(&self.key, new_raw, expected_version));
        bump_version(&mut state.object);
        state.writes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory[{}]", self.key)
    }
}

/// A local YAML file holding the whole document
///
/// The version token is the SHA-256 of the file contents. Writes go to a
/// sibling temp file and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read(&self) -> Result<String, StoreError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::fetch(format!("{}: {e}", self.path.display())))
    }
}

/// Hex SHA-256 of `content`
pub fn content_version(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn fetch(&self) -> Result<FetchedDocument, StoreError> {
        let raw = self.read().await?;
        if raw.trim().is_empty() {
            return Err(StoreError::fetch(format!("{} is empty", self.path.display())));
        }
        let version = content_version(&raw);
        debug!(path = %self.path.display(), version = %version, "Read threshold document");
        Ok(FetchedDocument {
            raw,
            version: Some(version),
        })
    }

    async fn patch_field(
        &self,
        new_raw: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(expected) = expected_version {
            let current = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| StoreError::patch(format!("{}: {e}", self.path.display())))?;
            if content_version(&current) != expected {
                return Err(StoreError::Conflict {
                    expected: expected.to_string(),
                });
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, new_raw)
            .await
            .map_err(|e| StoreError::patch(format!("{}: {e}", temp.display())))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::patch(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
