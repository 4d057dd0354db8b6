// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Metatron generation bot.
//!
//! This crate provides the trait definitions, error types, and common types
//! shared by the queue, the jobs, and every adapter.

pub mod error;
pub mod identity;
pub mod traits;
pub mod types;

pub use error::MetatronError;
pub use identity::{AdmissionKey, ExternalBucketing, Identity};
pub use types::{
    ActionKind, AdapterType, Attachment, AttachmentKind, ChannelCapabilities, ChatRequest,
    HealthStatus, HistoryEntry, ImageFlavor, ImageRequest, MessageAction, MessageId,
    MusicRequest, OutboundMessage, ReplyTarget,
};

pub use traits::{ChannelAdapter, GenerationBackend, PluginAdapter, UserStateStore};
