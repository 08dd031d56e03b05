//! Network state migrations.

use super::replace_labels_field;
use crate::error::MigrationError;
use crate::value::Attrs;

/// v0 -> v1: labels map -> label records.
pub fn labels_v0_to_v1(mut attrs: Attrs) -> Result<Attrs, MigrationError> {
    replace_labels_field(&mut attrs, "")?;
    Ok(attrs)
}
