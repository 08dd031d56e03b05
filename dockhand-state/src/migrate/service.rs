//! Service state migrations.

use serde_json::Value;

use super::{container, replace_labels_field};
use crate::error::MigrationError;
use crate::value::{malformed, Attrs};

/// v0 -> v1: labels map -> label records, including the container
/// specification embedded under `task_spec.container_spec`.
///
/// The embedded container spec carries the same migratable shape as a bare
/// container resource, so the container step is reused rather than copied.
pub fn labels_v0_to_v1(mut attrs: Attrs) -> Result<Attrs, MigrationError> {
    replace_labels_field(&mut attrs, "")?;
    migrate_task_specs(&mut attrs)?;
    Ok(attrs)
}

fn migrate_task_specs(attrs: &mut Attrs) -> Result<(), MigrationError> {
    let task_specs = match attrs.get_mut("task_spec") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(malformed("task_spec", "list", other)),
    };

    for (i, task_spec) in task_specs.iter_mut().enumerate() {
        let task_path = format!("task_spec.{i}");
        let task_spec = match task_spec {
            Value::Object(map) => map,
            other => return Err(malformed(&task_path, "map", other)),
        };

        let container_specs = match task_spec.get_mut("container_spec") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(malformed(
                    &format!("{task_path}.container_spec"),
                    "list",
                    other,
                ))
            }
        };

        for (j, container_spec) in container_specs.iter_mut().enumerate() {
            let container_path = format!("{task_path}.container_spec.{j}");
            let container_spec = match container_spec {
                Value::Object(map) => map,
                other => return Err(malformed(&container_path, "map", other)),
            };
            container::migrate_labels(container_spec, &container_path)?;
        }
    }

    Ok(())
}
