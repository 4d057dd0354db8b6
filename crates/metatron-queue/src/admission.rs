// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control: ban lookup plus the per-identity in-flight cap.

use std::sync::Arc;

use metatron_core::{AdmissionKey, ExternalBucketing, Identity, UserStateStore};
use thiserror::Error;

use crate::counters::{InFlightCounters, InFlightTicket};

/// Limits applied at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Jobs one identity may have queued or executing at once. Always at least 1.
    pub max_per_identity: usize,
    /// Optional ceiling on waiting jobs across all identities.
    pub max_total_depth: Option<usize>,
    pub bucketing: ExternalBucketing,
}

impl AdmissionPolicy {
    pub fn new(max_per_identity: usize) -> Self {
        Self {
            max_per_identity: max_per_identity.max(1),
            max_total_depth: None,
            bucketing: ExternalBucketing::default(),
        }
    }

    pub fn with_max_total_depth(mut self, max_total_depth: Option<usize>) -> Self {
        self.max_total_depth = max_total_depth;
        self
    }

    pub fn with_bucketing(mut self, bucketing: ExternalBucketing) -> Self {
        self.bucketing = bucketing;
        self
    }
}

/// Why a submission was turned away. Denials are expected outcomes, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("identity is banned")]
    Banned,
    #[error("identity already has {limit} jobs in flight")]
    IdentityLimit { limit: usize },
    #[error("queue already holds {depth} jobs")]
    QueueFull { depth: usize },
}

/// Gatekeeper consulted before every enqueue.
pub struct AdmissionController {
    policy: AdmissionPolicy,
    store: Arc<dyn UserStateStore>,
    counters: InFlightCounters,
}

impl AdmissionController {
    pub fn new(policy: AdmissionPolicy, store: Arc<dyn UserStateStore>) -> Self {
        Self {
            policy,
            store,
            counters: InFlightCounters::new(),
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn counters(&self) -> &InFlightCounters {
        &self.counters
    }

    pub fn key_for(&self, identity: &Identity) -> AdmissionKey {
        identity.admission_key(self.policy.bucketing)
    }

    /// Advisory predicate: not banned and below the per-identity cap.
    ///
    /// Has no side effects. Submissions go through [`Self::check_ban`] and
    /// [`Self::acquire`] so the cap check and increment stay inseparable.
    pub async fn may_enqueue(&self, identity: &Identity) -> bool {
        self.check_ban(identity).await.is_ok()
            && self.counters.count(&self.key_for(identity)) < self.policy.max_per_identity
    }

    /// Fails when the requester or the bucket it is billed to is banned.
    ///
    /// Bans are stored per principal, so one external viewer can be banned
    /// without touching the shared bucket. Banning the bucket key itself
    /// shuts out every principal in it.
    pub async fn check_ban(&self, identity: &Identity) -> Result<(), Denial> {
        let principal = identity.admission_key(ExternalBucketing::PerPrincipal);
        if self.store.is_banned(&principal).await {
            return Err(Denial::Banned);
        }
        let bucket = self.key_for(identity);
        if bucket != principal && self.store.is_banned(&bucket).await {
            return Err(Denial::Banned);
        }
        Ok(())
    }

    /// Applies the depth ceiling and per-identity cap and takes a slot.
    ///
    /// Synchronous on purpose: callers must not await between this and the enqueue.
    pub fn acquire(&self, key: &AdmissionKey, queued: usize) -> Result<InFlightTicket, Denial> {
        if let Some(max) = self.policy.max_total_depth {
            if queued >= max {
                return Err(Denial::QueueFull { depth: queued });
            }
        }
        self.counters
            .try_acquire(key, self.policy.max_per_identity)
            .ok_or(Denial::IdentityLimit {
                limit: self.policy.max_per_identity,
            })
    }
}
