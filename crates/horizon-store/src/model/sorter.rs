//! Sort criteria.
//!
//! On the wire sorters are an object of `field: "ASC" | "DESC"` in priority
//! order, e.g. `{"age":"ASC","name":"DESC"}`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;

use super::record::Record;
use crate::error::{Result, StoreError};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(StoreError::InvalidSortDirection(s.to_string())),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sorter {
    /// Field to compare.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl Sorter {
    /// Create a sort key.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Ascending sort key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    /// Descending sort key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Ordered sort keys, most significant first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sorters {
    keys: Vec<Sorter>,
}

impl Sorters {
    /// No sort keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single sort key.
    pub fn single(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            keys: vec![Sorter::new(field, direction)],
        }
    }

    /// Append a key, or update the direction of an existing one in place.
    pub fn push(&mut self, sorter: Sorter) {
        match self.keys.iter_mut().find(|s| s.field == sorter.field) {
            Some(existing) => existing.direction = sorter.direction,
            None => self.keys.push(sorter),
        }
    }

    /// Builder form of [`push`](Self::push).
    pub fn then(mut self, sorter: Sorter) -> Self {
        self.push(sorter);
        self
    }

    /// Keys in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Sorter> {
        self.keys.iter()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if some key compares `field`.
    pub fn references(&self, field: &str) -> bool {
        self.keys.iter().any(|s| s.field == field)
    }

    /// Compare two records key by key.
    ///
    /// Nulls order first ascending (and therefore last descending). Records
    /// equal on every key compare `Equal`, which a stable sort preserves.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.keys
            .iter()
            .map(|key| {
                key.direction
                    .apply(a.value(&key.field).total_cmp(b.value(&key.field)))
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Wire form.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.keys
                .iter()
                .map(|s| (s.field.clone(), Json::from(s.direction.as_str())))
                .collect(),
        )
    }

    /// Parse `{"field": "ASC"}` or `[{"field": "f", "direction": "DESC"}]`.
    pub fn from_json(raw: &Json) -> Result<Self> {
        let mut sorters = Self::new();
        match raw {
            Json::Object(map) => {
                for (field, direction) in map {
                    let direction = direction
                        .as_str()
                        .ok_or_else(|| StoreError::InvalidSortDirection(direction.to_string()))?
                        .parse()?;
                    sorters.push(Sorter::new(field.clone(), direction));
                }
            }
            Json::Array(items) => {
                for item in items {
                    let field = item
                        .get("field")
                        .and_then(Json::as_str)
                        .ok_or_else(|| StoreError::Config(format!("sorter without field: {item}")))?;
                    let direction = match item.get("direction").and_then(Json::as_str) {
                        Some(d) => d.parse()?,
                        None => SortDirection::Asc,
                    };
                    sorters.push(Sorter::new(field, direction));
                }
            }
            other => {
                return Err(StoreError::Config(format!(
                    "sorters must be an object or array, got {other}"
                )));
            }
        }
        Ok(sorters)
    }
}

impl FromIterator<Sorter> for Sorters {
    fn from_iter<I: IntoIterator<Item = Sorter>>(iter: I) -> Self {
        let mut sorters = Self::new();
        for sorter in iter {
            sorters.push(sorter);
        }
        sorters
    }
}

impl Serialize for Sorters {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sorters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Json::deserialize(deserializer)?;
        Self::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use serde_json::json;

    fn rec(raw: Json) -> Record {
        Record::from_json(&Schema::open(["id"]), &raw).unwrap()
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!(matches!(
            "up".parse::<SortDirection>(),
            Err(StoreError::InvalidSortDirection(_))
        ));
    }

    #[test]
    fn test_multi_key_compare() {
        let sorters = Sorters::new()
            .then(Sorter::asc("age"))
            .then(Sorter::desc("name"));
        let b = rec(json!({"id": 2, "name": "B", "age": 20}));
        let c = rec(json!({"id": 3, "name": "C", "age": 20}));
        let a = rec(json!({"id": 1, "name": "A", "age": 30}));
        assert_eq!(sorters.compare(&c, &b), Ordering::Less);
        assert_eq!(sorters.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_nulls_first_ascending_last_descending() {
        let null = rec(json!({"id": 1, "age": null}));
        let ten = rec(json!({"id": 2, "age": 10}));
        assert_eq!(
            Sorters::single("age", SortDirection::Asc).compare(&null, &ten),
            Ordering::Less
        );
        assert_eq!(
            Sorters::single("age", SortDirection::Desc).compare(&null, &ten),
            Ordering::Greater
        );
    }

    #[test]
    fn test_wire_forms() {
        let sorters = Sorters::from_json(&json!({"age": "ASC", "name": "desc"})).unwrap();
        assert_eq!(sorters.len(), 2);
        assert_eq!(
            serde_json::to_string(&sorters.to_json()).unwrap(),
            r#"{"age":"ASC","name":"DESC"}"#
        );
        let from_array =
            Sorters::from_json(&json!([{"field": "age"}, {"field": "name", "direction": "DESC"}]))
                .unwrap();
        assert_eq!(from_array, sorters);
        assert!(Sorters::from_json(&json!({"age": "sideways"})).is_err());
    }
}
