// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The unit of queued work.

use async_trait::async_trait;
use metatron_core::{Identity, MetatronError};

/// One unit of asynchronously executed work.
///
/// A job is created by a submission surface, owned by the queue until
/// dequeued, run once by the processor, and then dropped. Implementations
/// are expected to deliver or report their own failures; an `Err` (or a
/// panic) returned here is treated as a fault that escaped the job and is
/// only logged.
#[async_trait]
pub trait Job: Send + 'static {
    /// The identity the job is billed against.
    fn owner(&self) -> &Identity;

    /// Short label for logs, e.g. `chat` or `sdxl`.
    fn kind(&self) -> &str;

    /// Free-form parameter summary for logs (usually the prompt).
    fn summary(&self) -> String {
        String::new()
    }

    /// Runs the job to completion.
    async fn execute(self: Box<Self>) -> Result<(), MetatronError>;
}
