//! Container state migrations.

use serde_json::Value;

use super::replace_labels_field;
use crate::error::MigrationError;
use crate::value::{expect_object, join, malformed, Attrs};

/// v0 -> v1: labels move from the map representation to label records, both at
/// the top level and inside each mount's volume options.
pub fn labels_v0_to_v1(mut attrs: Attrs) -> Result<Attrs, MigrationError> {
    migrate_labels(&mut attrs, "")?;
    Ok(attrs)
}

/// Apply the container label migration to `attrs` in place.
///
/// Shared with the service migration, which embeds a full container
/// specification under `task_spec.container_spec`.
pub(crate) fn migrate_labels(attrs: &mut Attrs, parent: &str) -> Result<(), MigrationError> {
    replace_labels_field(attrs, parent)?;

    // Mounts written by a v0 writer may be absent entirely; the v1 schema
    // expects an empty list in that case.
    let mounts_path = join(parent, "mounts");
    let mounts = match attrs.remove("mounts") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(malformed(&mounts_path, "list", &other)),
    };

    let mut migrated = Vec::with_capacity(mounts.len());
    for (i, mount) in mounts.into_iter().enumerate() {
        let mount_path = format!("{mounts_path}.{i}");
        let mut mount = expect_object(mount, &mount_path)?;

        let options_path = join(&mount_path, "volume_options");
        match mount.remove("volume_options") {
            None | Some(Value::Null) => {}
            Some(Value::Array(options)) => {
                let mut out = Vec::with_capacity(options.len());
                for (j, option) in options.into_iter().enumerate() {
                    let option_path = format!("{options_path}.{j}");
                    let mut option = expect_object(option, &option_path)?;
                    replace_labels_field(&mut option, &option_path)?;
                    out.push(Value::Object(option));
                }
                mount.insert("volume_options".to_string(), Value::Array(out));
            }
            Some(other) => return Err(malformed(&options_path, "list", &other)),
        }

        migrated.push(Value::Object(mount));
    }
    attrs.insert("mounts".to_string(), Value::Array(migrated));

    Ok(())
}
