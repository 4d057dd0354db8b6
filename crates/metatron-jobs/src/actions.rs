// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up actions attached to delivered results.
//!
//! Every result that carries buttons is registered here under a random
//! token. The surface echoes the token back when a button is pressed and
//! the dispatcher looks the original request up again. The book keeps a
//! bounded number of entries and forgets the oldest first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use metatron_core::{ActionKind, Attachment, Identity, MessageAction, MessageId, ReplyTarget};
use tracing::debug;

use crate::spec::JobSpec;

/// What a result button needs to know about the request that produced it.
#[derive(Debug, Clone)]
pub struct ActionEntry {
    pub owner: Identity,
    pub target: ReplyTarget,
    pub spec: JobSpec,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
}

impl ActionEntry {
    /// Payload bytes held for this entry.
    pub fn weight(&self) -> usize {
        let attachments: usize = self.attachments.iter().map(|a| a.data.len()).sum();
        let source = match &self.spec {
            JobSpec::Image(spec) => spec.source_image.as_ref().map_or(0, Vec::len),
            _ => 0,
        };
        attachments + source
    }
}

/// A button press as reported by a surface.
#[derive(Debug, Clone)]
pub struct ActionPress {
    pub token: String,
    pub kind: ActionKind,
    pub clicker: Identity,
    /// The message carrying the pressed button.
    pub message: MessageId,
    /// Where the message lives.
    pub target: ReplyTarget,
    /// Private conversation with the clicker, for mailed copies.
    pub private_target: ReplyTarget,
}

#[derive(Default)]
struct Book {
    order: VecDeque<String>,
    entries: HashMap<String, Arc<ActionEntry>>,
    bytes: usize,
}

impl Book {
    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.order.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&oldest) {
            self.bytes = self.bytes.saturating_sub(entry.weight());
        }
        debug!(token = %oldest, bytes = self.bytes, "action token evicted");
        true
    }
}

/// Token -> entry map bounded by entry count and held payload bytes.
///
/// The oldest entries are evicted first. A single entry larger than the
/// byte budget is still kept, alone.
pub struct ActionBook {
    capacity: usize,
    max_bytes: usize,
    inner: Mutex<Book>,
}

impl ActionBook {
    pub const DEFAULT_CAPACITY: usize = 512;
    pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

    pub fn new(capacity: usize) -> Self {
        Self::with_limits(capacity, Self::DEFAULT_MAX_BYTES)
    }

    pub fn with_limits(capacity: usize, max_bytes: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            max_bytes,
            inner: Mutex::new(Book::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `entry` and returns its token.
    pub fn register(&self, entry: ActionEntry) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let weight = entry.weight();
        let mut book = self.lock();
        while book.order.len() >= self.capacity
            || (book.bytes + weight > self.max_bytes && !book.order.is_empty())
        {
            if !book.evict_oldest() {
                break;
            }
        }
        book.bytes += weight;
        book.order.push_back(token.clone());
        book.entries.insert(token.clone(), Arc::new(entry));
        token
    }

    pub fn get(&self, token: &str) -> Option<Arc<ActionEntry>> {
        self.lock().entries.get(token).cloned()
    }

    pub fn remove(&self, token: &str) -> Option<Arc<ActionEntry>> {
        let mut book = self.lock();
        book.order.retain(|t| t != token);
        let entry = book.entries.remove(token)?;
        book.bytes = book.bytes.saturating_sub(entry.weight());
        Some(entry)
    }

    /// Payload bytes currently held.
    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionBook {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// The standard Reroll / Mail / Delete row for `token`.
pub fn result_buttons(token: &str) -> Vec<MessageAction> {
    [ActionKind::Reroll, ActionKind::Mail, ActionKind::Delete]
        .into_iter()
        .map(|kind| MessageAction {
            kind,
            token: token.to_string(),
        })
        .collect()
}
