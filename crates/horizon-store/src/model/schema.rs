//! Field schemas.
//!
//! A [`Schema`] turns raw JSON objects into typed field maps. An *open* schema
//! (no declared fields) infers a type for every key it sees. A *closed* schema
//! keeps only its declared fields, coerces each to its declared type and
//! rejects values that cannot be coerced.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::value::{Value, parse_date};
use crate::error::{Result, StoreError};

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Whatever the JSON holds.
    #[default]
    Any,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Floating point number.
    Float,
    /// Text.
    Text,
    /// Calendar date.
    Date,
}

impl FieldType {
    /// Coerce a raw JSON value to this type. `null` is accepted for every type.
    pub fn coerce(self, field: &str, raw: &Json) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || StoreError::schema(field, format!("expected {self:?}, got {raw}"));
        match self {
            Self::Any => Ok(Value::from_json(raw)),
            Self::Bool => raw.as_bool().map(Value::Bool).ok_or_else(mismatch),
            Self::Int => match raw {
                Json::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(Value::Int)
                    .ok_or_else(mismatch),
                Json::String(s) => s.trim().parse().map(Value::Int).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Float => match raw {
                Json::Number(n) => n.as_f64().map(Value::Float).ok_or_else(mismatch),
                Json::String(s) => s.trim().parse().map(Value::Float).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Text => match raw {
                Json::String(s) => Ok(Value::Text(s.clone())),
                Json::Number(_) | Json::Bool(_) => Ok(Value::Text(raw.to_string())),
                _ => Err(mismatch()),
            },
            Self::Date => raw
                .as_str()
                .and_then(parse_date)
                .map(Value::Date)
                .ok_or_else(mismatch),
        }
    }
}

impl FromStr for FieldType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "auto" => Ok(Self::Any),
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "float" | "number" => Ok(Self::Float),
            "text" | "string" => Ok(Self::Text),
            "date" => Ok(Self::Date),
            other => Err(StoreError::Config(format!("unknown field type '{other}'"))),
        }
    }
}

/// A declared field.
///
/// Deserializes from either a bare name (`"age"`, type [`FieldType::Any`]) or
/// an object (`{"name": "age", "type": "int"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldDefRepr")]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl FieldDef {
    /// Create a field definition.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldDefRepr {
    Name(String),
    Full {
        name: String,
        #[serde(rename = "type", default)]
        ty: FieldType,
    },
}

impl From<FieldDefRepr> for FieldDef {
    fn from(repr: FieldDefRepr) -> Self {
        match repr {
            FieldDefRepr::Name(name) => Self::new(name, FieldType::Any),
            FieldDefRepr::Full { name, ty } => Self::new(name, ty),
        }
    }
}

/// Field layout and identity of the records in a store.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldDef>,
    primary_keys: Arc<[String]>,
}

impl Schema {
    /// An open schema: every key is kept and typed by inference.
    pub fn open<I, S>(primary_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Vec::new(),
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// A closed schema. Every primary key must be a declared field.
    pub fn new<I, S>(fields: Vec<FieldDef>, primary_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = Self {
            fields,
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
        };
        if !schema.fields.is_empty() {
            for key in schema.primary_keys.iter() {
                if schema.field(key).is_none() {
                    return Err(StoreError::Config(format!(
                        "primary key '{key}' is not a declared field"
                    )));
                }
            }
        }
        Ok(schema)
    }

    /// Returns `true` if no fields are declared.
    pub fn is_open(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared fields, empty for an open schema.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key field names.
    pub fn primary_keys(&self) -> &Arc<[String]> {
        &self.primary_keys
    }

    /// Build a typed field map from a raw JSON object, ignoring `skip` keys.
    pub fn build_fields(
        &self,
        raw: &Map<String, Json>,
        skip: &[&str],
    ) -> Result<BTreeMap<String, Value>> {
        if self.is_open() {
            return Ok(raw
                .iter()
                .filter(|(key, _)| !skip.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), Value::from_json(value)))
                .collect());
        }
        self.fields
            .iter()
            .filter(|def| !skip.contains(&def.name.as_str()))
            .map(|def| {
                let value = match raw.get(&def.name) {
                    Some(value) => def.ty.coerce(&def.name, value)?,
                    None => Value::Null,
                };
                Ok((def.name.clone(), value))
            })
            .collect()
    }
}
