// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent per-requester state.

use async_trait::async_trait;

use crate::error::MetatronError;
use crate::identity::AdmissionKey;
use crate::traits::adapter::PluginAdapter;
use crate::types::HistoryEntry;

/// Ban flags and conversation history keyed by admission key.
#[async_trait]
pub trait UserStateStore: PluginAdapter {
    /// Whether the key is banned. Missing or unreadable state means not banned.
    async fn is_banned(&self, key: &AdmissionKey) -> bool;

    /// Flips the ban flag and returns the new value.
    async fn toggle_ban(&self, key: &AdmissionKey) -> Result<bool, MetatronError>;

    /// Stored conversation, oldest first.
    ///
    /// `None` when the key has no stored document at all. A document that
    /// exists but is unreadable or has no history yields an empty list.
    async fn history(&self, key: &AdmissionKey)
    -> Result<Option<Vec<HistoryEntry>>, MetatronError>;

    /// Appends entries, evicting the oldest so at most `cap` remain.
    async fn append_history(
        &self,
        key: &AdmissionKey,
        entries: Vec<HistoryEntry>,
        cap: usize,
    ) -> Result<(), MetatronError>;

    /// Drops all stored conversation for the key.
    async fn clear_history(&self, key: &AdmissionKey) -> Result<(), MetatronError>;
}
