// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory user state store.

use std::collections::HashMap;

use async_trait::async_trait;
use metatron_core::{
    AdapterType, AdmissionKey, HealthStatus, HistoryEntry, MetatronError, PluginAdapter,
    UserStateStore,
};
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct UserState {
    banned: bool,
    history: Vec<HistoryEntry>,
}

/// Keeps ban flags and history in a map; nothing touches disk.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<AdmissionKey, UserState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ban(&self, key: impl Into<AdmissionKey>) {
        self.users
            .lock()
            .await
            .entry(key.into())
            .or_default()
            .banned = true;
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        Ok(())
    }
}

#[async_trait]
impl UserStateStore for MemoryStore {
    async fn is_banned(&self, key: &AdmissionKey) -> bool {
        self.users
            .lock()
            .await
            .get(key)
            .is_some_and(|state| state.banned)
    }

    async fn toggle_ban(&self, key: &AdmissionKey) -> Result<bool, MetatronError> {
        let mut users = self.users.lock().await;
        let state = users.entry(key.clone()).or_default();
        state.banned = !state.banned;
        Ok(state.banned)
    }

    async fn history(
        &self,
        key: &AdmissionKey,
    ) -> Result<Option<Vec<HistoryEntry>>, MetatronError> {
        Ok(self
            .users
            .lock()
            .await
            .get(key)
            .map(|state| state.history.clone()))
    }

    async fn append_history(
        &self,
        key: &AdmissionKey,
        entries: Vec<HistoryEntry>,
        cap: usize,
    ) -> Result<(), MetatronError> {
        let mut users = self.users.lock().await;
        let history = &mut users.entry(key.clone()).or_default().history;
        history.extend(entries);
        let excess = history.len().saturating_sub(cap);
        history.drain(..excess);
        Ok(())
    }

    async fn clear_history(&self, key: &AdmissionKey) -> Result<(), MetatronError> {
        if let Some(state) = self.users.lock().await.get_mut(key) {
            state.history.clear();
        }
        Ok(())
    }
}
