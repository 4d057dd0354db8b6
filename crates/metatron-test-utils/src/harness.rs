// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end queue tests.
//!
//! `TestHarness` wires a [`Scheduler`], a [`Dispatcher`] and a running
//! [`QueueProcessor`] to the mock backend, channel, and store, so a test
//! can submit specs the way a surface would and then inspect what was
//! delivered.

use std::sync::Arc;
use std::time::Duration;

use metatron_core::{ExternalBucketing, Identity, MetatronError, ReplyTarget};
use metatron_jobs::{Dispatcher, JobContext, JobSettings, JobSpec, Submission};
use metatron_queue::{AdmissionPolicy, QueueProcessor, Scheduler};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::memory_store::MemoryStore;
use crate::mock_backend::MockBackend;
use crate::mock_channel::MockChannel;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    backend: MockBackend,
    max_per_identity: usize,
    max_total_depth: Option<usize>,
    bucketing: ExternalBucketing,
    settings: JobSettings,
    spawn_processor: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: MockBackend::new(),
            max_per_identity: 2,
            max_total_depth: None,
            bucketing: ExternalBucketing::Shared,
            settings: JobSettings::default(),
            spawn_processor: true,
        }
    }

    /// Use a preconfigured backend.
    pub fn with_backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_max_user_queue(mut self, max: usize) -> Self {
        self.max_per_identity = max;
        self
    }

    pub fn with_max_total_depth(mut self, depth: usize) -> Self {
        self.max_total_depth = Some(depth);
        self
    }

    pub fn with_bucketing(mut self, bucketing: ExternalBucketing) -> Self {
        self.bucketing = bucketing;
        self
    }

    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Leave the processor unspawned; take it with [`TestHarness::take_processor`].
    pub fn without_processor(mut self) -> Self {
        self.spawn_processor = false;
        self
    }

    pub fn build(self) -> TestHarness {
        let backend = Arc::new(self.backend);
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MockChannel::new());

        let policy = AdmissionPolicy::new(self.max_per_identity)
            .with_max_total_depth(self.max_total_depth)
            .with_bucketing(self.bucketing);
        let (scheduler, processor) = Scheduler::new(policy, store.clone());
        let ctx = JobContext::new(backend.clone(), store.clone(), channel.clone(), self.settings);
        let dispatcher = Dispatcher::new(scheduler.clone(), ctx);

        let cancel = CancellationToken::new();
        let (processor, processor_task) = if self.spawn_processor {
            let token = cancel.clone();
            (None, Some(tokio::spawn(processor.run(token))))
        } else {
            (Some(processor), None)
        };

        TestHarness {
            backend,
            store,
            channel,
            scheduler,
            dispatcher,
            cancel,
            processor,
            processor_task,
        }
    }
}

/// A complete queue environment backed by mocks.
pub struct TestHarness {
    pub backend: Arc<MockBackend>,
    pub store: Arc<MemoryStore>,
    pub channel: Arc<MockChannel>,
    pub scheduler: Scheduler,
    pub dispatcher: Dispatcher,
    pub cancel: CancellationToken,
    processor: Option<QueueProcessor>,
    processor_task: Option<JoinHandle<()>>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Reply destination used by [`TestHarness::submit`].
    pub fn target() -> ReplyTarget {
        ReplyTarget::new("mock", "chat-1")
    }

    pub fn user(id: &str) -> Identity {
        Identity::native(id, format!("@{id}"))
    }

    /// Submits `spec` for `owner` to the default target.
    pub async fn submit(&self, owner: &Identity, spec: JobSpec) -> Result<Submission, MetatronError> {
        self.dispatcher
            .submit(owner.clone(), Self::target(), spec)
            .await
    }

    pub async fn chat(&self, owner: &Identity, prompt: &str) -> Submission {
        match self
            .submit(
                owner,
                JobSpec::Chat {
                    prompt: prompt.to_string(),
                },
            )
            .await
        {
            Ok(submission) => submission,
            Err(e) => panic!("chat submission rejected as invalid: {e}"),
        }
    }

    /// The unspawned processor, when built with `without_processor`.
    pub fn take_processor(&mut self) -> Option<QueueProcessor> {
        self.processor.take()
    }

    /// Waits until nothing is queued or executing, or panics after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) {
        let wait = async {
            while self.scheduler.depth() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            panic!("queue still holds {} jobs", self.scheduler.depth());
        }
    }

    /// Stops the processor and waits for it to return.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.processor_task.take() {
            let _ = task.await;
        }
    }
}
