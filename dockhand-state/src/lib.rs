//! dockhand-state: persisted resource state and schema migrations.
//!
//! A managed resource's persisted shape is a loosely-typed attribute bag tagged
//! with an integer schema version. When the schema for a resource kind changes
//! across releases, the migration pipeline upgrades old bags one version at a
//! time before the current schema interprets them, so resources already under
//! management never have to be destroyed and recreated.

pub mod bag;
pub mod label;
pub mod migrate;
pub mod value;

mod error;

pub use bag::{ManagedResource, ResourceKind, StateBag};
pub use error::MigrationError;
pub use label::{DuplicateLabelError, LabelRecord, LabelSet};
pub use migrate::{current_version, migrate_to_current};
pub use value::Attrs;
