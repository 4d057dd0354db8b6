// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-identity in-flight counters.
//!
//! A count is raised only through [`InFlightCounters::try_acquire`], which
//! hands back an [`InFlightTicket`]. The ticket lowers the count when it is
//! dropped, so every admitted job is released exactly once no matter how
//! its execution ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metatron_core::AdmissionKey;
use tracing::warn;

/// Shared map from admission key to queued-or-executing job count.
#[derive(Debug, Clone, Default)]
pub struct InFlightCounters {
    inner: Arc<Mutex<HashMap<AdmissionKey, usize>>>,
}

impl InFlightCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AdmissionKey, usize>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current count for `key`. Keys never seen count as zero.
    pub fn count(&self, key: &AdmissionKey) -> usize {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Raises the count for `key` if it is below `max`, in one locked step.
    pub fn try_acquire(&self, key: &AdmissionKey, max: usize) -> Option<InFlightTicket> {
        let mut counts = self.lock();
        let count = counts.entry(key.clone()).or_insert(0);
        if *count >= max {
            return None;
        }
        *count += 1;
        Some(InFlightTicket {
            key: key.clone(),
            counters: self.clone(),
        })
    }

    fn release(&self, key: &AdmissionKey) {
        let mut counts = self.lock();
        match counts.get_mut(key) {
            Some(count) if *count > 0 => *count -= 1,
            _ => warn!(key = %key, "in-flight counter release without matching acquire"),
        }
    }

    /// Point-in-time copy of every non-zero counter.
    pub fn snapshot(&self) -> Vec<(AdmissionKey, usize)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(key, count)| (key.clone(), *count))
            .collect();
        entries.sort();
        entries
    }
}

/// Proof that one job holds one slot in its identity's counter.
#[derive(Debug)]
pub struct InFlightTicket {
    key: AdmissionKey,
    counters: InFlightCounters,
}

impl InFlightTicket {
    pub fn key(&self) -> &AdmissionKey {
        &self.key
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.counters.release(&self.key);
    }
}
