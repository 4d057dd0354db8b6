// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single consumer that executes queued jobs one at a time.
//!
//! The processor is either idle (waiting on the queue) or executing exactly
//! one job. Whatever way a job ends, its [`InFlightTicket`] is dropped before
//! the next job is taken, which releases the owner's counter slot once.
//!
//! [`InFlightTicket`]: crate::counters::InFlightTicket

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::queue::{QueuedJob, RequestQueue};

/// How a single job left the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// The job returned an error it did not handle itself.
    Failed(String),
    /// The job panicked.
    Panicked(String),
}

/// Long-lived loop pulling from the [`RequestQueue`].
pub struct QueueProcessor {
    queue: Arc<RequestQueue>,
}

impl QueueProcessor {
    pub(crate) fn new(queue: Arc<RequestQueue>) -> Self {
        Self { queue }
    }

    /// Runs until `cancel` fires. A job already executing is finished first.
    pub async fn run(self, cancel: CancellationToken) {
        info!("queue processor running");
        while self.process_one(&cancel).await.is_some() {}
        info!(waiting = self.queue.size(), "queue processor stopped");
    }

    /// Waits for the next job and executes it. Returns `None` once `cancel` fires.
    pub async fn process_one(&self, cancel: &CancellationToken) -> Option<JobOutcome> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            item = self.queue.dequeue() => item,
        };
        Some(self.process(next).await)
    }

    /// Executes one dequeued job and settles its bookkeeping.
    pub async fn process(&self, item: QueuedJob) -> JobOutcome {
        let QueuedJob {
            job,
            ticket,
            enqueued_at,
        } = item;

        self.queue.set_executing(true);
        let owner = job.owner().to_string();
        let kind = job.kind().to_string();
        let summary = job.summary();
        debug!(
            identity = %owner,
            kind = %kind,
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "job started"
        );

        let outcome = match AssertUnwindSafe(job.execute()).catch_unwind().await {
            Ok(Ok(())) => {
                info!(identity = %owner, kind = %kind, "job finished");
                JobOutcome::Completed
            }
            Ok(Err(e)) => {
                error!(identity = %owner, kind = %kind, prompt = %summary, error = %e, "job failed");
                JobOutcome::Failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(identity = %owner, kind = %kind, prompt = %summary, panic = %message, "job panicked");
                JobOutcome::Panicked(message)
            }
        };

        drop(ticket);
        self.queue.set_executing(false);
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
