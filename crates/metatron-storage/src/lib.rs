// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-identity state kept as one JSON document per admission key.
//!
//! Documents look like `{"banned": false, "history": [{"role": ..., "content": ...}]}`.
//! Unknown fields are preserved on rewrite. A missing or unparsable document
//! reads as empty state; it is never an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use metatron_core::{
    AdapterType, AdmissionKey, HealthStatus, HistoryEntry, MetatronError, PluginAdapter,
    UserStateStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// On-disk shape of one identity's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stores each identity in `<dir>/<key>.json`.
pub struct JsonUserStore {
    dir: PathBuf,
    locks: DashMap<AdmissionKey, Arc<Mutex<()>>>,
}

impl JsonUserStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &AdmissionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    fn lock_for(&self, key: &AdmissionKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Reads the document for `key`. `None` when no file exists.
    pub async fn load(&self, key: &AdmissionKey) -> Option<UserDocument> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable user document, treating as empty");
                return Some(UserDocument::default());
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt user document, treating as empty");
                Some(UserDocument::default())
            }
        }
    }

    async fn save(&self, key: &AdmissionKey, doc: &UserDocument) -> Result<(), MetatronError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(MetatronError::storage)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(doc).map_err(MetatronError::storage)?;
        tokio::fs::write(&tmp, body)
            .await
            .map_err(MetatronError::storage)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(MetatronError::storage)?;
        debug!(path = %path.display(), "user document written");
        Ok(())
    }

    /// Read-modify-write under the per-key lock.
    async fn update<T: Send>(
        &self,
        key: &AdmissionKey,
        change: impl FnOnce(&mut UserDocument) -> T + Send,
    ) -> Result<T, MetatronError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        let mut doc = self.load(key).await.unwrap_or_default();
        let out = change(&mut doc);
        self.save(key, &doc).await?;
        Ok(out)
    }
}

#[async_trait]
impl PluginAdapter for JsonUserStore {
    fn name(&self) -> &str {
        "json-user-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Unhealthy(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(_) => Ok(HealthStatus::Degraded(format!(
                "{} does not exist yet",
                self.dir.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        Ok(())
    }
}

#[async_trait]
impl UserStateStore for JsonUserStore {
    async fn is_banned(&self, key: &AdmissionKey) -> bool {
        self.load(key).await.is_some_and(|doc| doc.banned)
    }

    async fn toggle_ban(&self, key: &AdmissionKey) -> Result<bool, MetatronError> {
        let banned = self
            .update(key, |doc| {
                doc.banned = !doc.banned;
                doc.banned
            })
            .await?;
        info!(key = %key, banned, "ban toggled");
        Ok(banned)
    }

    async fn history(
        &self,
        key: &AdmissionKey,
    ) -> Result<Option<Vec<HistoryEntry>>, MetatronError> {
        Ok(self.load(key).await.map(|doc| doc.history))
    }

    async fn append_history(
        &self,
        key: &AdmissionKey,
        entries: Vec<HistoryEntry>,
        cap: usize,
    ) -> Result<(), MetatronError> {
        self.update(key, |doc| {
            doc.history.extend(entries);
            let excess = doc.history.len().saturating_sub(cap);
            doc.history.drain(..excess);
        })
        .await
    }

    async fn clear_history(&self, key: &AdmissionKey) -> Result<(), MetatronError> {
        self.update(key, |doc| doc.history.clear()).await
    }
}
