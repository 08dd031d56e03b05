//! Versioned attribute bags for managed resources.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Attrs;

/// Kind of an externally-owned resource under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    Network,
    Volume,
    Service,
    Secret,
    Config,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Service => "service",
            ResourceKind::Secret => "secret",
            ResourceKind::Config => "config",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted resource representation: a loosely-typed attribute bag plus the
/// schema version it was written under.
///
/// A bag is interpretable by exactly one schema version at a time. Migrations
/// replace it wholesale and never leave it partially upgraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBag {
    pub version: u32,
    pub attrs: Attrs,
}

impl StateBag {
    pub fn new(version: u32, attrs: Attrs) -> Self {
        Self { version, attrs }
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// One externally-owned object under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Opaque id assigned by the engine. Set once when creation succeeds,
    /// never reassigned; the caller clears it after a confirmed removal.
    pub id: String,
    pub kind: ResourceKind,
    pub state: StateBag,
}
