//! Label set and the codec between the two persisted label representations.
//!
//! Early schema versions stored user labels as an unordered `name -> value`
//! map; current versions store a list of `{label, value}` records so entries
//! can be diffed and addressed individually. Record identity is the label name
//! alone: changing a value updates the record in place, it never produces an
//! add plus remove pair. The hash used to address records is an internal
//! detail of [`LabelSet`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::MigrationError;
use crate::value::{expect_string, join, Attrs};

/// A single `{label, value}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub label: String,
    pub value: String,
}

/// Returned by [`LabelSet::try_from_records`] when two records share a name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate label `{0}`")]
pub struct DuplicateLabelError(pub String);

/// A set of labels keyed by name.
///
/// The set exclusively owns its records; there is no positional identity, so
/// reordering the persisted record list never reads as a change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    records: HashMap<u64, LabelRecord>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or update a label, returning the previous value if the name was
    /// already present.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let record = LabelRecord {
            label: label.into(),
            value: value.into(),
        };
        self.records
            .insert(identity(&record.label), record)
            .map(|old| old.value)
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.records
            .get(&identity(label))
            .map(|record| record.value.as_str())
    }

    pub fn remove(&mut self, label: &str) -> Option<String> {
        self.records.remove(&identity(label)).map(|old| old.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelRecord> {
        self.records.values()
    }

    /// Build from the old map representation.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut set = Self::new();
        for (label, value) in map {
            set.insert(label.clone(), value.clone());
        }
        set
    }

    /// Collapse into the old map representation.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.records
            .values()
            .map(|record| (record.label.clone(), record.value.clone()))
            .collect()
    }

    /// Build from records; a later duplicate name wins over an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = LabelRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record.label, record.value);
        }
        set
    }

    /// Build from records, rejecting duplicate names.
    pub fn try_from_records(
        records: impl IntoIterator<Item = LabelRecord>,
    ) -> Result<Self, DuplicateLabelError> {
        let mut set = Self::new();
        for record in records {
            if set.get(&record.label).is_some() {
                return Err(DuplicateLabelError(record.label));
            }
            set.insert(record.label, record.value);
        }
        Ok(set)
    }

    /// Extract the records; iteration order is unspecified.
    pub fn to_records(&self) -> Vec<LabelRecord> {
        self.records.values().cloned().collect()
    }

    /// Decode from a map-shaped attribute value (the pre-record persisted
    /// representation). Values must be strings.
    pub fn from_attr_map(map: &Attrs, path: &str) -> Result<Self, MigrationError> {
        let mut set = Self::new();
        for (label, value) in map {
            let value = expect_string(value, &join(path, label))?;
            set.insert(label.clone(), value);
        }
        Ok(set)
    }

    /// Encode into the record-list attribute value used by current schemas.
    pub fn to_attr_records(&self) -> Value {
        Value::Array(
            self.records
                .values()
                .map(|record| {
                    let mut attrs = Attrs::new();
                    attrs.insert("label".to_string(), Value::String(record.label.clone()));
                    attrs.insert("value".to_string(), Value::String(record.value.clone()));
                    Value::Object(attrs)
                })
                .collect(),
        )
    }
}

impl FromIterator<(String, String)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (label, value) in iter {
            set.insert(label, value);
        }
        set
    }
}

/// Stable identity of a record: FNV-1a over the label name only, so a value
/// change keeps the identity and reads as an update.
fn identity(label: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in label.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> HashMap<String, String> {
        HashMap::from([
            ("env".to_string(), "dev".to_string()),
            ("team".to_string(), "x".to_string()),
        ])
    }

    #[test]
    fn test_map_round_trip() {
        let map = sample_map();
        assert_eq!(LabelSet::from_map(&map).to_map(), map);
    }

    #[test]
    fn test_identity_is_name_only() {
        let mut set = LabelSet::new();
        set.insert("env", "dev");
        // Same name, different value: an update, not an add.
        let replaced = set.insert("env", "prod");
        assert_eq!(replaced.as_deref(), Some("dev"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("env"), Some("prod"));
    }

    #[test]
    fn test_from_records_later_duplicate_wins() {
        let set = LabelSet::from_records([
            LabelRecord {
                label: "env".to_string(),
                value: "dev".to_string(),
            },
            LabelRecord {
                label: "env".to_string(),
                value: "prod".to_string(),
            },
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("env"), Some("prod"));
    }

    #[test]
    fn test_try_from_records_rejects_duplicates() {
        let err = LabelSet::try_from_records([
            LabelRecord {
                label: "env".to_string(),
                value: "dev".to_string(),
            },
            LabelRecord {
                label: "env".to_string(),
                value: "prod".to_string(),
            },
        ])
        .unwrap_err();
        assert_eq!(err, DuplicateLabelError("env".to_string()));
    }

    #[test]
    fn test_attr_codec_round_trip() {
        let set = LabelSet::from_map(&sample_map());
        let records = set.to_attr_records();
        let items = records.as_array().unwrap();
        assert_eq!(items.len(), 2);

        let decoded = LabelSet::from_records(
            items
                .iter()
                .map(|item| serde_json::from_value::<LabelRecord>(item.clone()).unwrap()),
        );
        assert_eq!(decoded.to_map(), sample_map());
    }

    #[test]
    fn test_from_attr_map_rejects_non_string_values() {
        let mut attrs = Attrs::new();
        attrs.insert("replicas".to_string(), serde_json::json!(3));
        assert!(LabelSet::from_attr_map(&attrs, "labels").is_err());
    }
}
