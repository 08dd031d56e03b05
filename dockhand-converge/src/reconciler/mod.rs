//! Per-kind reconcilers.
//!
//! Each reconciler pairs one mutating engine call with a convergence run,
//! choosing the pending/target classification appropriate to its resource
//! kind. The caller serializes operations per resource id; two concurrent
//! runs against the same id are not supported.

pub mod network;
pub mod service;
pub mod volume;

pub use network::NetworkReconciler;
pub use service::{ServiceConvergeConfig, ServiceReconciler};
pub use volume::VolumeReconciler;

/// State tags shared by the read/remove probes.
pub(crate) mod state_tags {
    /// The engine has not settled yet; keep polling.
    pub const PENDING: &str = "pending";
    /// Every field the caller needs is populated.
    pub const ALL_FIELDS: &str = "all_fields";
    /// The resource is gone.
    pub const REMOVED: &str = "removed";
    /// Removal refused because a dependent still uses the resource.
    pub const IN_USE: &str = "in_use";
}
