// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requester identities and the keys used to bucket them for admission.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who asked for a piece of work.
///
/// Native identities come from the chat platform the bot lives on and carry
/// a stable platform id. External identities arrive through an event bridge
/// (for example a streaming platform's reward redemptions) and are only known
/// by their source and a login name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Native { id: String, display_name: String },
    External { source: String, principal: String },
}

impl Identity {
    pub fn native(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::Native {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn external(source: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::External {
            source: source.into(),
            principal: principal.into(),
        }
    }

    /// Text used to address the requester in a reply.
    pub fn mention(&self) -> &str {
        match self {
            Self::Native { display_name, .. } => display_name,
            Self::External { principal, .. } => principal,
        }
    }

    /// Derives the admission bucket for this identity.
    ///
    /// Native identities always get their own bucket. External identities
    /// either share one bucket per source or get one per principal.
    pub fn admission_key(&self, bucketing: ExternalBucketing) -> AdmissionKey {
        match self {
            Self::Native { id, .. } => AdmissionKey(id.clone()),
            Self::External { source, principal } => match bucketing {
                ExternalBucketing::Shared => AdmissionKey(source.clone()),
                ExternalBucketing::PerPrincipal => AdmissionKey(format!("{source}:{principal}")),
            },
        }
    }

    /// True when both identities name the same requester, ignoring display names.
    pub fn same_requester(&self, other: &Identity) -> bool {
        match (self, other) {
            (Self::Native { id: a, .. }, Self::Native { id: b, .. }) => a == b,
            (
                Self::External {
                    source: sa,
                    principal: pa,
                },
                Self::External {
                    source: sb,
                    principal: pb,
                },
            ) => sa == sb && pa == pb,
            _ => false,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { id, display_name } => write!(f, "{display_name} ({id})"),
            Self::External { source, principal } => write!(f, "{source}:{principal}"),
        }
    }
}

/// How external identities map onto admission buckets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExternalBucketing {
    /// Every principal from one source shares a single bucket.
    #[default]
    Shared,
    /// Each principal gets a bucket of its own.
    PerPrincipal,
}

/// The key under which in-flight counts, bans, and history are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdmissionKey(pub String);

impl AdmissionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A filesystem-safe stem derived from the key.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for AdmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdmissionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
