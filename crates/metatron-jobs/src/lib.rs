// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation jobs for the Metatron bot.
//!
//! Surfaces describe what they want as a [`JobSpec`] and hand it to the
//! [`Dispatcher`], which validates it, wraps it in a [`GenerationJob`] and
//! offers it to the queue. Result buttons come back through
//! [`Dispatcher::press`].

pub mod actions;
pub mod cards;
pub mod context;
pub mod dispatcher;
pub mod generation;
pub mod render;
pub mod settings;
pub mod spec;

pub use actions::{ActionBook, ActionEntry, ActionPress};
pub use context::JobContext;
pub use dispatcher::{Dispatcher, Submission};
pub use generation::GenerationJob;
pub use settings::JobSettings;
pub use spec::{ImageSpec, JobSpec, MusicSpec};
