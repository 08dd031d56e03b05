//! Port-mapping ordering migration.

use serde_json::Value;

use crate::error::MigrationError;
use crate::value::{expect_u64, malformed, Attrs};

/// Container v1 -> v2: stable-sort the `ports` list by internal port.
///
/// v1 persisted ports in whatever order the engine happened to return them,
/// which differed between reads and showed up as spurious diffs. Sorting by
/// the container-internal port (ascending, ties keeping their input order)
/// makes the persisted order deterministic. Absent ports stay absent; null
/// entries left behind by historical decoders are dropped.
pub fn sort_v1_to_v2(mut attrs: Attrs) -> Result<Attrs, MigrationError> {
    let ports = match attrs.remove("ports") {
        None => return Ok(attrs),
        Some(Value::Null) => return Ok(attrs),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(malformed("ports", "list", &other)),
    };

    let mut mapped = Vec::with_capacity(ports.len());
    for (i, port) in ports.into_iter().enumerate() {
        if port.is_null() {
            continue;
        }
        let path = format!("ports.{i}");
        let internal = match &port {
            Value::Object(entry) => expect_u64(
                entry.get("internal").unwrap_or(&Value::Null),
                &format!("{path}.internal"),
            )?,
            other => return Err(malformed(&path, "map", other)),
        };
        mapped.push((internal, port));
    }

    // sort_by_key is stable: equal internal ports keep their relative order.
    mapped.sort_by_key(|(internal, _)| *internal);

    attrs.insert(
        "ports".to_string(),
        Value::Array(mapped.into_iter().map(|(_, port)| port).collect()),
    );
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attrs {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_ports_sorted_by_internal() {
        let migrated = sort_v1_to_v2(attrs(json!({
            "ports": [
                { "internal": 80, "external": 8080 },
                { "internal": 22, "external": 2222 },
                { "internal": 443, "external": 8443 }
            ]
        })))
        .unwrap();

        let internals: Vec<u64> = migrated["ports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|port| port["internal"].as_u64().unwrap())
            .collect();
        assert_eq!(internals, vec![22, 80, 443]);
    }

    #[test]
    fn test_sort_is_order_independent() {
        let ports = vec![
            json!({ "internal": 80 }),
            json!({ "internal": 22 }),
            json!({ "internal": 443 }),
        ];

        let mut permutations = Vec::new();
        for rotation in 0..ports.len() {
            let mut rotated = ports.clone();
            rotated.rotate_left(rotation);
            let mut input = Attrs::new();
            input.insert("ports".to_string(), Value::Array(rotated));
            permutations.push(sort_v1_to_v2(input).unwrap()["ports"].clone());
        }
        assert!(permutations.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let migrated = sort_v1_to_v2(attrs(json!({
            "ports": [
                { "internal": 80, "protocol": "udp" },
                { "internal": 22 },
                { "internal": 80, "protocol": "tcp" }
            ]
        })))
        .unwrap();

        let sorted = migrated["ports"].as_array().unwrap();
        assert_eq!(sorted[0]["internal"], json!(22));
        assert_eq!(sorted[1]["protocol"], json!("udp"));
        assert_eq!(sorted[2]["protocol"], json!("tcp"));
    }

    #[test]
    fn test_absent_ports_stay_absent() {
        let migrated = sort_v1_to_v2(attrs(json!({ "name": "web" }))).unwrap();
        assert!(!migrated.contains_key("ports"));
    }

    #[test]
    fn test_null_entries_dropped() {
        let migrated = sort_v1_to_v2(attrs(json!({
            "ports": [null, { "internal": 80 }, null]
        })))
        .unwrap();
        assert_eq!(migrated["ports"], json!([ { "internal": 80 } ]));
    }

    #[test]
    fn test_missing_internal_is_fatal() {
        let err = sort_v1_to_v2(attrs(json!({
            "ports": [ { "external": 8080 } ]
        })))
        .unwrap_err();
        match err {
            MigrationError::MalformedState { path, .. } => assert_eq!(path, "ports.0.internal"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
