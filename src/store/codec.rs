//! Typed-value encoding used by the document store's REST API.
//!
//! Every field travels as a single-key object naming its type, e.g.
//! `{"integerValue": "42"}` or `{"arrayValue": {"values": [...]}}`.

use serde_json::{json, Map, Value};

use crate::record::{FieldValue, Record};

/// Pseudo-field carrying the document id on decoded documents. Never
/// written back.
pub const DOC_ID_FIELD: &str = "_docId";

/// Fields that exist only on the client side.
pub const RESERVED_FIELDS: &[&str] = &[DOC_ID_FIELD];

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        FieldValue::Int(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Float(f) => json!({ "doubleValue": f }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::List(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(map) => json!({ "mapValue": { "fields": encode_map(map.iter()) } }),
        FieldValue::Raw(raw) => raw.clone(),
    }
}

fn encode_map<'a, I>(fields: I) -> Map<String, Value>
where
    I: Iterator<Item = (&'a String, &'a FieldValue)>,
{
    fields
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// Encode a document's writable fields, skipping reserved ones.
pub fn encode_fields(record: &Record) -> Map<String, Value> {
    encode_map(record.iter().filter(|(name, _)| !is_reserved(name)))
}

/// Decode one typed value.
///
/// Shapes without a native [`FieldValue`] (timestamps, geo points,
/// references, bytes, anything unrecognized) are kept as
/// [`FieldValue::Raw`] and re-encode to the exact input.
pub fn decode_value(value: &Value) -> FieldValue {
    let Some(object) = value.as_object() else {
        return FieldValue::Raw(value.clone());
    };
    let raw = || FieldValue::Raw(value.clone());
    if object.contains_key("nullValue") {
        return FieldValue::Null;
    }

    if let Some(s) = object.get("stringValue").and_then(Value::as_str) {
        return FieldValue::String(s.to_string());
    }
    if let Some(number) = object.get("integerValue") {
        return match number {
            Value::String(s) => s.parse().map(FieldValue::Int).unwrap_or_else(|_| raw()),
            Value::Number(n) => n.as_i64().map(FieldValue::Int).unwrap_or_else(raw),
            _ => raw(),
        };
    }
    if let Some(f) = object.get("doubleValue").and_then(Value::as_f64) {
        return FieldValue::Float(f);
    }
    if let Some(b) = object.get("booleanValue").and_then(Value::as_bool) {
        return FieldValue::Bool(b);
    }
    if let Some(array) = object.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(decode_value).collect())
            .unwrap_or_default();
        return FieldValue::List(values);
    }
    if let Some(map) = object.get("mapValue") {
        let fields = map
            .get("fields")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), decode_value(v)))
                    .collect()
            })
            .unwrap_or_default();
        return FieldValue::Map(fields);
    }
    raw()
}

/// Decode a store document (`{"name": ".../<id>", "fields": {...}}`).
///
/// The last segment of `name` is exposed as [`DOC_ID_FIELD`].
pub fn decode_document(document: &Value) -> Record {
    let mut record: Record = document
        .get("fields")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(name, v)| (name.clone(), decode_value(v)))
                .collect()
        })
        .unwrap_or_default();

    let doc_id = document
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .unwrap_or_default();
    record.insert(DOC_ID_FIELD.to_string(), FieldValue::String(doc_id.to_string()));
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode_value(&FieldValue::Int(42)), json!({"integerValue": "42"}));
        assert_eq!(encode_value(&FieldValue::Null), json!({"nullValue": null}));
        assert_eq!(encode_value(&FieldValue::Bool(true)), json!({"booleanValue": true}));
        assert_eq!(encode_value(&FieldValue::Float(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(encode_value(&FieldValue::from("x")), json!({"stringValue": "x"}));
    }

    #[test]
    fn test_encode_nested() {
        let mut inner = indexmap::IndexMap::new();
        inner.insert("k".to_string(), FieldValue::Int(1));
        let value = FieldValue::List(vec![FieldValue::from("a"), FieldValue::Map(inner)]);

        assert_eq!(
            encode_value(&value),
            json!({"arrayValue": {"values": [
                {"stringValue": "a"},
                {"mapValue": {"fields": {"k": {"integerValue": "1"}}}}
            ]}})
        );
    }

    #[test]
    fn test_encode_fields_skips_doc_id() {
        let mut record = Record::new();
        record.insert("id".to_string(), FieldValue::Int(3));
        record.insert(DOC_ID_FIELD.to_string(), FieldValue::from("3"));

        let encoded = encode_fields(&record);
        assert_eq!(encoded.len(), 1);
        assert!(encoded.contains_key("id"));
    }

    #[test]
    fn test_decode_document() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/tbl_employee/17",
            "fields": {
                "id": {"integerValue": "17"},
                "legacy": {"integerValue": 18},
                "rate": {"doubleValue": 2.5},
                "active": {"booleanValue": false},
                "seen": {"timestampValue": "2026-01-01T00:00:00Z"},
                "modules": {"arrayValue": {"values": [{"stringValue": "hr"}]}},
                "empty": {"arrayValue": {}},
                "meta": {"mapValue": {"fields": {"a": {"nullValue": null}}}},
                "odd": {"geoPointValue": {"latitude": 1.0}}
            }
        });
        let record = decode_document(&doc);

        assert_eq!(record["id"], FieldValue::Int(17));
        assert_eq!(record["legacy"], FieldValue::Int(18));
        assert_eq!(record["rate"], FieldValue::Float(2.5));
        assert_eq!(record["active"], FieldValue::Bool(false));
        assert_eq!(record["seen"], FieldValue::Raw(json!({"timestampValue": "2026-01-01T00:00:00Z"})));
        assert_eq!(record["modules"], FieldValue::from(vec!["hr".to_string()]));
        assert_eq!(record["empty"], FieldValue::List(vec![]));
        assert!(matches!(&record["meta"], FieldValue::Map(m) if m["a"].is_null()));
        assert_eq!(record["odd"], FieldValue::Raw(json!({"geoPointValue": {"latitude": 1.0}})));
        assert_eq!(record[DOC_ID_FIELD], FieldValue::from("17"));
    }

    #[test]
    fn test_decode_encode_preserves_store_values() {
        let original = json!({"mapValue": {"fields": {
            "n": {"integerValue": "-5"},
            "tags": {"arrayValue": {"values": [{"booleanValue": true}, {"nullValue": null}]}}
        }}});
        assert_eq!(encode_value(&decode_value(&original)), original);
    }

    #[test]
    fn test_unrepresentable_values_reencode_unchanged() {
        let values = [
            json!({"timestampValue": "2020-01-01T00:00:00Z"}),
            json!({"geoPointValue": {"latitude": 14.55, "longitude": 121.02}}),
            json!({"referenceValue": "projects/p/databases/(default)/documents/photos/1"}),
            json!({"bytesValue": "aGVsbG8="}),
            json!({"integerValue": "not-a-number"}),
        ];
        for value in values {
            assert_eq!(encode_value(&decode_value(&value)), value);
        }
    }
}
