//! Schema migrations for persisted resource state.
//!
//! Each step upgrades a bag exactly one version (`V -> V+1`); the pipeline
//! chains steps until the current version for the kind is reached. Adding a
//! schema version therefore means writing one new step, never touching the
//! historical ones. Steps are pure `Attrs -> Attrs` functions and tolerate
//! optional sub-structures that older writers never emitted, but a required
//! structure with the wrong shape is a fatal [`MigrationError`].

pub mod container;
pub mod network;
pub mod ports;
pub mod service;
pub mod volume;

use serde_json::Value;
use tracing::info;

use crate::bag::{ResourceKind, StateBag};
use crate::error::MigrationError;
use crate::label::LabelSet;
use crate::value::{join, malformed, Attrs};

/// Current schema version for each resource kind.
pub const fn current_version(kind: ResourceKind) -> u32 {
    match kind {
        ResourceKind::Container => 2,
        ResourceKind::Network | ResourceKind::Volume | ResourceKind::Service => 1,
        ResourceKind::Secret | ResourceKind::Config => 0,
    }
}

/// Upgrade `bag` to the current schema version for `kind`.
///
/// A bag already at the current version passes through untouched. A bag from a
/// newer release fails with [`MigrationError::VersionAhead`].
pub fn migrate_to_current(kind: ResourceKind, mut bag: StateBag) -> Result<StateBag, MigrationError> {
    let current = current_version(kind);
    if bag.version > current {
        return Err(MigrationError::VersionAhead {
            kind,
            found: bag.version,
            current,
        });
    }

    while bag.version < current {
        info!(
            kind = %kind,
            from = bag.version,
            to = bag.version + 1,
            "migrating persisted state"
        );
        bag.attrs = step(kind, bag.version, bag.attrs)?;
        bag.version += 1;
    }

    Ok(bag)
}

fn step(kind: ResourceKind, from: u32, attrs: Attrs) -> Result<Attrs, MigrationError> {
    match (kind, from) {
        (ResourceKind::Container, 0) => container::labels_v0_to_v1(attrs),
        (ResourceKind::Container, 1) => ports::sort_v1_to_v2(attrs),
        (ResourceKind::Network, 0) => network::labels_v0_to_v1(attrs),
        (ResourceKind::Volume, 0) => volume::labels_v0_to_v1(attrs),
        (ResourceKind::Service, 0) => service::labels_v0_to_v1(attrs),
        // `current_version` and this table are maintained together; a gap
        // between them is a bug in this module, not a runtime condition.
        _ => unreachable!("no migration step for {kind} v{from}"),
    }
}

/// Replace a map-shaped `labels` field with the record-list representation.
///
/// Absent or null labels become an empty list, never an omitted field. Input
/// already in list shape is left untouched, so applying a label step twice
/// cannot corrupt the bag.
pub(crate) fn replace_labels_field(attrs: &mut Attrs, parent: &str) -> Result<(), MigrationError> {
    let path = join(parent, "labels");
    let records = match attrs.remove("labels") {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Object(map)) => LabelSet::from_attr_map(&map, &path)?.to_attr_records(),
        Some(list @ Value::Array(_)) => list,
        Some(other) => return Err(malformed(&path, "map", &other)),
    };
    attrs.insert("labels".to_string(), records);
    Ok(())
}
