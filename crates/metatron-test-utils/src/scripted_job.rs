// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instrumented jobs for exercising the queue directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use metatron_core::{Identity, MetatronError};
use metatron_queue::Job;
use tokio::sync::oneshot;

/// What a [`ScriptedJob`] does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    Panic,
}

/// Records entry and exit of every job sharing it.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    events: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ExecutionLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self, label: &str) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.push(format!("start:{label}"));
    }

    fn exit(&self, label: &str) {
        self.push(format!("end:{label}"));
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }

    /// Entry and exit events in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Labels in the order their execution started.
    pub fn start_order(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("start:").map(String::from))
            .collect()
    }

    /// Highest number of jobs seen executing at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

struct ExitGuard<'a> {
    log: &'a ExecutionLog,
    label: &'a str,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.log.exit(self.label);
    }
}

/// A job whose behaviour and timing are controlled by the test.
pub struct ScriptedJob {
    owner: Identity,
    label: String,
    script: Script,
    log: Arc<ExecutionLog>,
    gate: Option<oneshot::Receiver<()>>,
    duration: Option<Duration>,
}

impl ScriptedJob {
    pub fn new(owner: Identity, label: &str, log: &Arc<ExecutionLog>) -> Self {
        Self {
            owner,
            label: label.to_string(),
            script: Script::Succeed,
            log: Arc::clone(log),
            gate: None,
            duration: None,
        }
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    /// Holds the job inside `execute()` until the returned sender fires or is dropped.
    pub fn gated(mut self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        self.gate = Some(rx);
        (self, tx)
    }

    /// Sleeps this long inside `execute()`. Pair with a paused clock.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn boxed(self) -> Box<dyn Job> {
        Box::new(self)
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn owner(&self) -> &Identity {
        &self.owner
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    fn summary(&self) -> String {
        self.label.clone()
    }

    async fn execute(self: Box<Self>) -> Result<(), MetatronError> {
        let this = *self;
        this.log.enter(&this.label);
        let _exit = ExitGuard {
            log: &this.log,
            label: &this.label,
        };
        if let Some(gate) = this.gate {
            let _ = gate.await;
        }
        if let Some(duration) = this.duration {
            tokio::time::sleep(duration).await;
        }
        tokio::task::yield_now().await;
        match this.script {
            Script::Succeed => Ok(()),
            Script::Fail => Err(MetatronError::Internal(format!("{} failed", this.label))),
            Script::Panic => panic!("{} panicked", this.label),
        }
    }
}
