// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Metatron integration tests.
//!
//! Provides mock adapters and a harness for fast, deterministic tests
//! without a chat platform or a generation server.
//!
//! # Components
//!
//! - [`MockBackend`] - generation backend with scripted replies and failures
//! - [`MockChannel`] - chat surface capturing sends, acks, and deletions
//! - [`MemoryStore`] - in-memory ban flags and history
//! - [`ScriptedJob`] - instrumented job for exercising the queue directly
//! - [`TestHarness`] - scheduler, dispatcher, and processor wired to the mocks

pub mod harness;
pub mod memory_store;
pub mod mock_backend;
pub mod mock_channel;
pub mod scripted_job;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryStore;
pub use mock_backend::{BackendCall, FAKE_PNG, FAKE_WAV, MockBackend};
pub use mock_channel::MockChannel;
pub use scripted_job::{ExecutionLog, Script, ScriptedJob};
