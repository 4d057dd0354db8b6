// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod channel;
pub mod store;

pub use adapter::PluginAdapter;
pub use backend::GenerationBackend;
pub use channel::ChannelAdapter;
pub use store::UserStateStore;
