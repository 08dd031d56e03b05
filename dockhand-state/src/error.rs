//! Migration error types.

use thiserror::Error;

use crate::bag::ResourceKind;

/// Errors raised while upgrading a persisted state bag.
///
/// Any of these indicates corrupted persisted state or a schema written by a
/// newer release, never a transient condition worth retrying.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The bag claims a schema version newer than this build understands.
    #[error("unsupported schema version {found} for {kind} (current is {current})")]
    VersionAhead {
        kind: ResourceKind,
        found: u32,
        current: u32,
    },

    /// A sub-structure does not have the shape its declared version guarantees.
    #[error("malformed state at `{path}`: expected {expected}, found {found}")]
    MalformedState {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}
