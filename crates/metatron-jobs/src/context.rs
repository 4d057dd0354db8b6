// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handles every job needs while executing.

use std::sync::Arc;

use metatron_core::{
    AdmissionKey, ChannelAdapter, ExternalBucketing, GenerationBackend, Identity, UserStateStore,
};

use crate::actions::ActionBook;
use crate::settings::JobSettings;

/// Shared collaborators cloned into each job at submission time.
#[derive(Clone)]
pub struct JobContext {
    pub backend: Arc<dyn GenerationBackend>,
    pub store: Arc<dyn UserStateStore>,
    pub channel: Arc<dyn ChannelAdapter>,
    pub actions: Arc<ActionBook>,
    pub settings: Arc<JobSettings>,
}

impl JobContext {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn UserStateStore>,
        channel: Arc<dyn ChannelAdapter>,
        settings: JobSettings,
    ) -> Self {
        Self {
            backend,
            store,
            channel,
            actions: Arc::new(ActionBook::default()),
            settings: Arc::new(settings),
        }
    }
}

/// Key for an identity's own history document.
///
/// History is never shared, even when external principals share an
/// admission bucket.
pub fn history_key(identity: &Identity) -> AdmissionKey {
    identity.admission_key(ExternalBucketing::PerPrincipal)
}
