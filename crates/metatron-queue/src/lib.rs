// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-identity bounded, single-consumer job queue.
//!
//! Submission surfaces hand boxed [`Job`]s to a [`Scheduler`]. Admission
//! checks the owner's ban flag and in-flight count, takes a counter slot,
//! and appends to the FIFO [`RequestQueue`]. One [`QueueProcessor`] runs
//! jobs strictly in order, one at a time, releasing the slot when each job
//! ends however it ends.

pub mod admission;
pub mod counters;
pub mod job;
pub mod processor;
pub mod queue;
pub mod scheduler;

pub use admission::{AdmissionController, AdmissionPolicy, Denial};
pub use counters::{InFlightCounters, InFlightTicket};
pub use job::Job;
pub use processor::{JobOutcome, QueueProcessor};
pub use queue::{QueuedJob, RequestQueue};
pub use scheduler::{Admitted, Scheduler};
