//! Filter criteria and their evaluation.
//!
//! On the wire a filter set is an object keyed by field name:
//!
//! ```json
//! {"age": {"value": 30, "operator": ">="}, "name": {"value": "ann", "operator": "like"}}
//! ```
//!
//! Filters whose value is `null`, an empty string or an empty list are
//! inactive: they are kept in the set but neither evaluated nor sent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json, json};

use super::record::Record;
use super::value::Value;
use crate::error::{Result, StoreError};

/// How multiple active filters combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Every filter must match.
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    /// At least one filter must match.
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl FilterMode {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for FilterMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(StoreError::Config(format!("unknown filter mode '{other}'"))),
        }
    }
}

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterOperator {
    /// Equal (`=`).
    #[default]
    Eq,
    /// Not equal (`!=`).
    Ne,
    /// Greater than (`>`).
    Gt,
    /// Less than (`<`).
    Lt,
    /// Greater or equal (`>=`).
    Ge,
    /// Less or equal (`<=`).
    Le,
    /// Case-insensitive substring match.
    Like,
    /// Every whitespace-separated term matches as `like`.
    LikeAll,
    /// Value is one of a list.
    In,
    /// Value is none of a list.
    NotIn,
    /// Inclusive `[from, to]` range; either bound may be `null`.
    Range,
    /// Same calendar day, or an inclusive `[from, to]` date range.
    Date,
}

impl FilterOperator {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Like => "like",
            Self::LikeAll => "likeall",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Range => "range",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "ne" => Ok(Self::Ne),
            ">" | "gt" => Ok(Self::Gt),
            "<" | "lt" => Ok(Self::Lt),
            ">=" | "ge" => Ok(Self::Ge),
            "<=" | "le" => Ok(Self::Le),
            "like" => Ok(Self::Like),
            "likeall" => Ok(Self::LikeAll),
            "in" => Ok(Self::In),
            "notin" | "not in" => Ok(Self::NotIn),
            "range" | "between" => Ok(Self::Range),
            "date" => Ok(Self::Date),
            _ => Err(StoreError::UnknownOperator(s.to_string())),
        }
    }
}

/// The operand of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A single value.
    Single(Value),
    /// A list of values (`in`, `notin`, `range`, date ranges).
    List(Vec<Value>),
}

impl FilterValue {
    fn from_json(raw: &Json) -> Self {
        match raw {
            Json::Array(items) => Self::List(items.iter().map(Value::from_json).collect()),
            other => Self::Single(Value::from_json(other)),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Single(value) => value.to_json(),
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Single(value) => value.is_blank(),
            Self::List(items) => items.iter().all(Value::is_blank),
        }
    }
}

macro_rules! single_filter_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Single(value.into())
                }
            }
        )*
    };
}

single_filter_value!(Value, bool, i32, i64, f64, &str, String, chrono::NaiveDate);

impl<T: Into<Value>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single filter criterion on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: String,
    value: FilterValue,
    operator: FilterOperator,
}

impl Filter {
    /// Create a filter, validating the operand shape for the operator.
    pub fn new(
        field: impl Into<String>,
        value: impl Into<FilterValue>,
        operator: FilterOperator,
    ) -> Result<Self> {
        let field = field.into();
        let value = match (operator, value.into()) {
            (FilterOperator::In | FilterOperator::NotIn, FilterValue::Single(v)) if !v.is_null() => {
                FilterValue::List(vec![v])
            }
            (FilterOperator::Range, FilterValue::List(items)) if items.len() != 2 => {
                return Err(StoreError::invalid_filter_value(
                    field,
                    operator.as_str(),
                    format!("expected [from, to], got {} values", items.len()),
                ));
            }
            (FilterOperator::Range, FilterValue::Single(v)) if !v.is_blank() => {
                return Err(StoreError::invalid_filter_value(
                    field,
                    operator.as_str(),
                    "expected [from, to]",
                ));
            }
            (FilterOperator::Date, FilterValue::List(items)) if items.len() > 2 => {
                return Err(StoreError::invalid_filter_value(
                    field,
                    operator.as_str(),
                    "expected a date or [from, to]",
                ));
            }
            (_, value) => value,
        };
        Ok(Self {
            field,
            value,
            operator,
        })
    }

    /// Create a filter from a wire operator name.
    pub fn parse(
        field: impl Into<String>,
        value: impl Into<FilterValue>,
        operator: &str,
    ) -> Result<Self> {
        Self::new(field, value, operator.parse()?)
    }

    /// Field the filter applies to.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Operand.
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Operator.
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// Returns `false` when the operand is null, empty text or an empty list.
    pub fn is_active(&self) -> bool {
        !self.value.is_blank()
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.value(&self.field);
        match self.operator {
            FilterOperator::Eq => self.eq_single(actual),
            FilterOperator::Ne => !self.eq_single(actual),
            FilterOperator::Gt => self.cmp_single(actual, |o| o.is_gt()),
            FilterOperator::Lt => self.cmp_single(actual, |o| o.is_lt()),
            FilterOperator::Ge => self.cmp_single(actual, |o| o.is_ge()),
            FilterOperator::Le => self.cmp_single(actual, |o| o.is_le()),
            FilterOperator::Like => {
                let needle = self.operand_text();
                contains_ci(&actual.display_text(), &needle)
            }
            FilterOperator::LikeAll => {
                let haystack = actual.display_text();
                self.operand_text()
                    .split_whitespace()
                    .all(|term| contains_ci(&haystack, term))
            }
            FilterOperator::In => self.in_list(actual),
            FilterOperator::NotIn => !self.in_list(actual),
            FilterOperator::Range => {
                if actual.is_null() {
                    return false;
                }
                let list = self.list();
                let from = list.first().filter(|v| !v.is_blank());
                let to = list.get(1).filter(|v| !v.is_blank());
                from.is_none_or(|f| actual.total_cmp(&f.coerce_like(actual)).is_ge())
                    && to.is_none_or(|t| actual.total_cmp(&t.coerce_like(actual)).is_le())
            }
            FilterOperator::Date => {
                let Some(day) = actual.as_date() else {
                    return false;
                };
                match &self.value {
                    FilterValue::Single(v) => v.as_date() == Some(day),
                    FilterValue::List(items) => {
                        let from = items.first().and_then(Value::as_date);
                        let to = items.get(1).and_then(Value::as_date);
                        from.is_none_or(|f| day >= f) && to.is_none_or(|t| day <= t)
                    }
                }
            }
        }
    }

    fn single(&self) -> &Value {
        match &self.value {
            FilterValue::Single(v) => v,
            FilterValue::List(items) => items.first().unwrap_or(&Value::Null),
        }
    }

    fn list(&self) -> &[Value] {
        match &self.value {
            FilterValue::Single(v) => std::slice::from_ref(v),
            FilterValue::List(items) => items,
        }
    }

    fn operand_text(&self) -> String {
        self.single().display_text().into_owned()
    }

    fn in_list(&self, actual: &Value) -> bool {
        self.list()
            .iter()
            .any(|v| v.coerce_like(actual).loose_eq(actual))
    }

    fn eq_single(&self, actual: &Value) -> bool {
        self.single().coerce_like(actual).loose_eq(actual)
    }

    fn cmp_single(&self, actual: &Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> bool {
        if actual.is_null() {
            return false;
        }
        pred(actual.total_cmp(&self.single().coerce_like(actual)))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// An ordered set of filters, at most one per field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filters {
    items: Vec<Filter>,
}

impl Filters {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the filter for its field.
    pub fn set(&mut self, filter: Filter) {
        match self.items.iter_mut().find(|f| f.field == filter.field) {
            Some(existing) => *existing = filter,
            None => self.items.push(filter),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, filter: Filter) -> Self {
        self.set(filter);
        self
    }

    /// Remove the filter on `field`.
    pub fn remove(&mut self, field: &str) -> Option<Filter> {
        let pos = self.items.iter().position(|f| f.field == field)?;
        Some(self.items.remove(pos))
    }

    /// Filter on `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Filter> {
        self.items.iter().find(|f| f.field == field)
    }

    /// All filters, including inactive ones.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.items.iter()
    }

    /// Active filters only.
    pub fn active(&self) -> impl Iterator<Item = &Filter> {
        self.items.iter().filter(|f| f.is_active())
    }

    /// Returns `true` if no filter is active.
    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Returns `true` if an active filter tests `field`.
    pub fn references(&self, field: &str) -> bool {
        self.active().any(|f| f.field == field)
    }

    /// Number of filters, including inactive ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Remove every filter.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Evaluate the active filters against a record.
    pub fn matches(&self, record: &Record, mode: FilterMode) -> bool {
        let mut active = self.active().peekable();
        if active.peek().is_none() {
            return true;
        }
        match mode {
            FilterMode::And => active.all(|f| f.matches(record)),
            FilterMode::Or => active.any(|f| f.matches(record)),
        }
    }

    /// Wire form of the active filters.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.active()
                .map(|f| {
                    (
                        f.field.clone(),
                        json!({ "value": f.value.to_json(), "operator": f.operator.as_str() }),
                    )
                })
                .collect(),
        )
    }

    /// Parse the wire form.
    ///
    /// Each entry may be `{"value": v, "operator": op}` or a bare value, which
    /// means `=`.
    pub fn from_json(raw: &Json) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| StoreError::Config(format!("filters must be an object, got {raw}")))?;
        let mut filters = Self::new();
        for (field, entry) in object {
            filters.set(parse_entry(field, entry)?);
        }
        Ok(filters)
    }
}

fn parse_entry(field: &str, entry: &Json) -> Result<Filter> {
    match entry {
        Json::Object(spec) if spec.contains_key("value") || spec.contains_key("operator") => {
            let value = spec
                .get("value")
                .map(FilterValue::from_json)
                .unwrap_or(FilterValue::Single(Value::Null));
            let operator = match spec.get("operator") {
                Some(Json::String(op)) => op.parse()?,
                Some(other) => return Err(StoreError::UnknownOperator(other.to_string())),
                None => FilterOperator::Eq,
            };
            Filter::new(field, value, operator)
        }
        other => Filter::new(field, FilterValue::from_json(other), FilterOperator::Eq),
    }
}

impl Serialize for Filters {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Map::<String, Json>::deserialize(deserializer)?;
        Self::from_json(&Json::Object(raw)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;

    fn person(id: i64, name: &str, age: Option<i64>) -> Record {
        Record::from_json(
            &Schema::open(["id"]),
            &json!({"id": id, "name": name, "age": age, "born": "1990-06-15"}),
        )
        .unwrap()
    }

    fn f(field: &str, value: impl Into<FilterValue>, op: &str) -> Filter {
        Filter::parse(field, value, op).unwrap()
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Filter::parse("age", 3, "~=").unwrap_err();
        assert!(matches!(err, StoreError::UnknownOperator(op) if op == "~="));
    }

    #[test]
    fn test_comparisons() {
        let r = person(1, "Ann", Some(30));
        assert!(f("age", 30, "=").matches(&r));
        assert!(f("age", "30", "=").matches(&r));
        assert!(f("age", 31, "!=").matches(&r));
        assert!(f("age", 29, ">").matches(&r));
        assert!(f("age", 30, ">=").matches(&r));
        assert!(!f("age", 30, "<").matches(&r));
        assert!(f("age", 30.5, "<=").matches(&r));
    }

    #[test]
    fn test_null_field_fails_ordering() {
        let r = person(1, "Ann", None);
        assert!(!f("age", 0, ">").matches(&r));
        assert!(!f("age", 100, "<").matches(&r));
        assert!(!f("age", vec![0, 100], "range").matches(&r));
    }

    #[test]
    fn test_like_and_likeall() {
        let r = person(1, "Ann Marie Smith", Some(30));
        assert!(f("name", "marie", "like").matches(&r));
        assert!(f("name", "smith ann", "likeall").matches(&r));
        assert!(!f("name", "smith bob", "likeall").matches(&r));
    }

    #[test]
    fn test_in_notin_range() {
        let r = person(1, "Ann", Some(30));
        assert!(f("age", vec![10, 30], "in").matches(&r));
        assert!(!f("age", vec![10, 30], "notin").matches(&r));
        assert!(f("age", 30, "in").matches(&r));
        assert!(f("age", vec![Value::Int(20), Value::Null], "range").matches(&r));
        assert!(!f("age", vec![31, 40], "range").matches(&r));
        assert!(Filter::parse("age", vec![1, 2, 3], "range").is_err());
    }

    #[test]
    fn test_date_operator() {
        let r = person(1, "Ann", Some(30));
        assert!(f("born", "1990-06-15", "date").matches(&r));
        assert!(f("born", vec!["1990-01-01", "1990-12-31"], "date").matches(&r));
        assert!(!f("born", vec!["1991-01-01", "1991-12-31"], "date").matches(&r));
    }

    #[test]
    fn test_inactive_filters_are_ignored() {
        let r = person(1, "Ann", Some(30));
        let filters = Filters::new()
            .with(f("name", "", "like"))
            .with(f("age", Value::Null, "="))
            .with(f("id", Vec::<Value>::new(), "in"));
        assert!(filters.is_empty());
        assert_eq!(filters.len(), 3);
        assert!(filters.matches(&r, FilterMode::And));
        assert_eq!(filters.to_json(), json!({}));
    }

    #[test]
    fn test_modes() {
        let r = person(1, "Ann", Some(30));
        let filters = Filters::new()
            .with(f("name", "ann", "like"))
            .with(f("age", 99, "="));
        assert!(!filters.matches(&r, FilterMode::And));
        assert!(filters.matches(&r, FilterMode::Or));
    }

    #[test]
    fn test_set_replaces_same_field() {
        let mut filters = Filters::new();
        filters.set(f("age", 1, ">"));
        filters.set(f("age", 2, "<"));
        assert_eq!(filters.len(), 1);
        assert_eq!(filters.get("age").unwrap().operator(), FilterOperator::Lt);
    }

    #[test]
    fn test_wire_round_trip_shape() {
        let raw = json!({"age": {"value": 30, "operator": ">="}, "name": "Ann"});
        let filters = Filters::from_json(&raw).unwrap();
        assert_eq!(
            filters.to_json(),
            json!({
                "age": {"value": 30, "operator": ">="},
                "name": {"value": "Ann", "operator": "="}
            })
        );
        assert!(Filters::from_json(&json!({"age": {"value": 1, "operator": "??"}})).is_err());
    }

    #[test]
    fn test_filter_mode_parse() {
        assert_eq!("or".parse::<FilterMode>().unwrap(), FilterMode::Or);
        assert!("xor".parse::<FilterMode>().is_err());
    }
}
