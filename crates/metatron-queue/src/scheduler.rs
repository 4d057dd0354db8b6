// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The submission handle shared by every surface.

use std::sync::Arc;

use metatron_core::{Identity, UserStateStore};
use tracing::{debug, info};

use crate::admission::{AdmissionController, AdmissionPolicy, Denial};
use crate::job::Job;
use crate::processor::QueueProcessor;
use crate::queue::{QueuedJob, RequestQueue};

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Jobs waiting or executing ahead of this one when it was enqueued.
    pub ahead: usize,
}

/// Cheap-to-clone handle owning the queue state.
///
/// Built once at startup together with its [`QueueProcessor`] and passed to
/// every submission surface.
#[derive(Clone)]
pub struct Scheduler {
    admission: Arc<AdmissionController>,
    queue: Arc<RequestQueue>,
}

impl Scheduler {
    pub fn new(policy: AdmissionPolicy, store: Arc<dyn UserStateStore>) -> (Self, QueueProcessor) {
        let queue = Arc::new(RequestQueue::new());
        let scheduler = Self {
            admission: Arc::new(AdmissionController::new(policy, store)),
            queue: Arc::clone(&queue),
        };
        (scheduler, QueueProcessor::new(queue))
    }

    /// Admits and enqueues `job`, or says why not.
    ///
    /// The ban lookup may suspend. Everything after it (depth ceiling,
    /// per-identity cap, increment, enqueue) runs without an await point.
    pub async fn submit(&self, job: Box<dyn Job>) -> Result<Admitted, Denial> {
        if let Err(denial) = self.admission.check_ban(job.owner()).await {
            info!(identity = %job.owner(), kind = job.kind(), "submission from banned identity rejected");
            return Err(denial);
        }

        let key = self.admission.key_for(job.owner());
        let ahead = self.depth();
        let ticket = match self.admission.acquire(&key, self.queue.size()) {
            Ok(ticket) => ticket,
            Err(denial) => {
                info!(identity = %job.owner(), kind = job.kind(), reason = %denial, "submission denied");
                return Err(denial);
            }
        };
        debug!(identity = %job.owner(), kind = job.kind(), ahead, "job queued");
        self.queue.enqueue(QueuedJob::new(job, ticket));
        Ok(Admitted { ahead })
    }

    /// Advisory admission predicate with no side effects.
    pub async fn may_enqueue(&self, identity: &Identity) -> bool {
        self.admission.may_enqueue(identity).await
    }

    /// Waiting jobs plus one if a job is executing.
    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_executing()
    }

    /// Jobs `identity` currently has queued or executing.
    pub fn in_flight(&self, identity: &Identity) -> usize {
        self.admission
            .counters()
            .count(&self.admission.key_for(identity))
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.admission.policy()
    }
}
