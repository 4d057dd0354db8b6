// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unbounded FIFO between submission surfaces and the processor.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::Notify;

use crate::counters::InFlightTicket;
use crate::job::Job;

/// A job together with the counter slot it holds.
pub struct QueuedJob {
    pub job: Box<dyn Job>,
    pub ticket: InFlightTicket,
    pub enqueued_at: Instant,
}

impl QueuedJob {
    pub fn new(job: Box<dyn Job>, ticket: InFlightTicket) -> Self {
        Self {
            job,
            ticket,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedJob>,
    executing: bool,
}

/// FIFO with a single logical consumer.
///
/// Capacity is unbounded; backpressure comes from admission control. The
/// queue also tracks whether the consumer is executing a job, so that depth
/// never undercounts between a dequeue and the start of execution.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends to the tail. Never blocks, never fails.
    pub fn enqueue(&self, item: QueuedJob) {
        self.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Waits for and removes the head of the queue, marking the consumer busy.
    ///
    /// Cancel safe: dropping the future never loses an item.
    pub async fn dequeue(&self) -> QueuedJob {
        loop {
            let next = {
                let mut state = self.lock();
                let next = state.items.pop_front();
                if next.is_some() {
                    state.executing = true;
                }
                next
            };
            if let Some(item) = next {
                return item;
            }
            self.available.notified().await;
        }
    }

    pub(crate) fn set_executing(&self, executing: bool) {
        self.lock().executing = executing;
    }

    /// Non-blocking snapshot of the number of waiting jobs.
    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_executing(&self) -> bool {
        self.lock().executing
    }

    /// Waiting jobs plus one if a job is executing.
    pub fn depth(&self) -> usize {
        let state = self.lock();
        state.items.len() + usize::from(state.executing)
    }
}
