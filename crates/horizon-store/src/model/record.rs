//! Records and record identity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use super::schema::Schema;
use super::value::Value;
use crate::error::{Result, StoreError};

static NULL: Value = Value::Null;

/// Canonical identity of a record.
///
/// Built from the primary-key values (or every field when no primary key is
/// configured) serialized as JSON with keys in sorted order. Two records with
/// equal hashes are the same logical row, across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHash(String);

impl RecordHash {
    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of data with change tracking.
///
/// `set` records the pre-edit value the first time a field changes; `commit`
/// makes the current values the new baseline and `reject` rolls back to it.
#[derive(Debug, Clone)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    primary_keys: Arc<[String]>,
}

impl Record {
    /// Create a record from typed fields.
    pub fn new(fields: BTreeMap<String, Value>, primary_keys: Arc<[String]>) -> Self {
        Self {
            original: fields.clone(),
            fields,
            dirty: BTreeSet::new(),
            primary_keys,
        }
    }

    /// Build a record from a raw JSON object through `schema`.
    pub fn from_json(schema: &Schema, raw: &Json) -> Result<Self> {
        Self::from_json_skipping(schema, raw, &[])
    }

    pub(crate) fn from_json_skipping(schema: &Schema, raw: &Json, skip: &[&str]) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| StoreError::MalformedResponse(format!("record is not an object: {raw}")))?;
        let fields = schema.build_fields(object, skip)?;
        Ok(Self::new(fields, schema.primary_keys().clone()))
    }

    /// Field value, or `None` if the record has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value, `Null` if missing.
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Set a field. Returns `false` when the value is unchanged.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.value(field) == &value {
            return false;
        }
        let original = self.original.get(field).unwrap_or(&NULL);
        if original == &value {
            self.dirty.remove(field);
        } else {
            self.dirty.insert(field.to_string());
        }
        self.fields.insert(field.to_string(), value);
        true
    }

    /// All current field values.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Primary key field names.
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    /// Returns `true` if any field differs from its committed value.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns `true` if `field` differs from its committed value.
    pub fn is_updated(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    /// Dirty fields with their current values.
    pub fn get_changes(&self) -> BTreeMap<String, Value> {
        self.dirty
            .iter()
            .map(|field| (field.clone(), self.value(field).clone()))
            .collect()
    }

    /// Committed primary-key values (all committed values without a primary key).
    ///
    /// This is what the backend uses to locate the row it must update.
    pub fn get_origin(&self) -> BTreeMap<String, Value> {
        if self.primary_keys.is_empty() {
            return self.original.clone();
        }
        self.primary_keys
            .iter()
            .map(|key| (key.clone(), self.original.get(key).cloned().unwrap_or_default()))
            .collect()
    }

    /// Accept current values as the new baseline.
    pub fn commit(&mut self) {
        self.original = self.fields.clone();
        self.dirty.clear();
    }

    /// Accept `sent` as the committed values of those fields only.
    ///
    /// A field edited again after `sent` was captured stays dirty, as does
    /// every field `sent` does not name.
    pub fn commit_fields(&mut self, sent: &BTreeMap<String, Value>) {
        for (field, value) in sent {
            self.original.insert(field.clone(), value.clone());
            if self.value(field) == value {
                self.dirty.remove(field);
            } else {
                self.dirty.insert(field.clone());
            }
        }
    }

    /// Roll back to the committed values.
    pub fn reject(&mut self) {
        self.fields = self.original.clone();
        self.dirty.clear();
    }

    /// Canonical identity of the current values.
    pub fn hash(&self) -> RecordHash {
        let identity: BTreeMap<&str, Json> = if self.primary_keys.is_empty() {
            self.fields
                .iter()
                .map(|(key, value)| (key.as_str(), value.to_json()))
                .collect()
        } else {
            self.primary_keys
                .iter()
                .map(|key| (key.as_str(), self.value(key).to_json()))
                .collect()
        };
        // Serializing a map of JSON values cannot fail.
        RecordHash(serde_json::to_string(&identity).unwrap_or_default())
    }

    /// Primary-key values as a JSON object, used as `parent`/`child` parameters.
    pub fn key_json(&self) -> Json {
        let map: Map<String, Json> = if self.primary_keys.is_empty() {
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect()
        } else {
            self.primary_keys
                .iter()
                .map(|key| (key.clone(), self.value(key).to_json()))
                .collect()
        };
        Json::Object(map)
    }

    /// All current values as a JSON object.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

pub(crate) fn map_to_json(map: &BTreeMap<String, Value>) -> Json {
    Json::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(raw: Json) -> Record {
        Record::from_json(&Schema::open(["id"]), &raw).unwrap()
    }

    #[test]
    fn test_set_tracks_changes() {
        let mut r = record(json!({"id": 1, "name": "A"}));
        assert!(!r.set("name", "A"));
        assert!(!r.is_dirty());

        assert!(r.set("name", "B"));
        assert!(r.is_updated("name"));
        assert_eq!(r.get_changes().get("name"), Some(&Value::from("B")));
        assert_eq!(r.get_origin().get("id"), Some(&Value::Int(1)));

        // Setting back to the committed value clears the dirty flag.
        assert!(r.set("name", "A"));
        assert!(!r.is_dirty());
    }

    #[test]
    fn test_commit_and_reject() {
        let mut r = record(json!({"id": 1, "name": "A"}));
        r.set("name", "B");
        r.reject();
        assert_eq!(r.value("name"), &Value::from("A"));
        assert!(!r.is_dirty());

        r.set("name", "C");
        r.commit();
        assert!(!r.is_dirty());
        assert_eq!(r.get_changes().len(), 0);
        r.set("name", "A");
        assert!(r.is_updated("name"));
    }

    #[test]
    fn test_commit_fields_keeps_later_edits() {
        let mut r = record(json!({"id": 1, "name": "A", "age": 1}));
        r.set("name", "B");
        let sent = r.get_changes();
        r.set("age", 5);

        r.commit_fields(&sent);
        assert!(!r.is_updated("name"));
        assert!(r.is_updated("age"));
        assert_eq!(r.get_changes().len(), 1);

        // Edited again after being captured: the newer value still needs sending.
        r.set("name", "C");
        let sent = r.get_changes();
        r.set("name", "D");
        r.commit_fields(&sent);
        assert!(r.is_updated("name"));
        r.reject();
        assert_eq!(r.value("name"), &Value::from("C"));
    }

    #[test]
    fn test_origin_survives_key_edit() {
        let mut r = record(json!({"id": 1}));
        r.set("id", 2);
        assert_eq!(r.get_origin().get("id"), Some(&Value::Int(1)));
        assert_eq!(r.hash().as_str(), r#"{"id":2}"#);
    }

    #[test]
    fn test_hash_uses_primary_keys() {
        let a = record(json!({"id": 7, "name": "A"}));
        let b = record(json!({"id": 7, "name": "Z"}));
        assert_eq!(a.hash(), b.hash());

        let schema = Schema::open(Vec::<String>::new());
        let c = Record::from_json(&schema, &json!({"b": 1, "a": 2})).unwrap();
        assert_eq!(c.hash().as_str(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_missing_field_is_null() {
        let r = record(json!({"id": 1}));
        assert!(r.get("nope").is_none());
        assert!(r.value("nope").is_null());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Record::from_json(&Schema::default(), &json!(3)).is_err());
    }
}
