//! The argument tree of a multi-row read.
//!
//! A read request is a recursive structure: a root [`FindManyArgs`] carries an
//! optional filter, ordering and paging, plus `include`/`select` containers that
//! map relation (or scalar) field names to a [`Selection`]. A selection is
//! either a bare flag or a nested argument tree scoped to the relation's target
//! entity, so every level of the tree has the same shape as the root.
//!
//! The JSON form mirrors the usual ORM request shape:
//!
//! ```
//! use softscope::args::{FindManyArgs, Selection};
//! let args: FindManyArgs = serde_json::from_str(
//!     r#"{ "where": { "email": "a@example.com" },
//!          "orderBy": { "id": "asc" },
//!          "include": { "posts": { "where": { "title": { "contains": "Rust" } } } } }"#,
//! ).unwrap();
//! assert!(matches!(args.include.unwrap()["posts"], Selection::Nested(_)));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::{Result, SoftscopeError};

pub type RelationSelection = BTreeMap<String, Selection>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyArgs {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<RelationSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<RelationSelection>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_order_by"
    )]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    // Any other read option travels through untouched.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn include_relation(mut self, name: impl Into<String>, selection: Selection) -> Self {
        self.include
            .get_or_insert_with(RelationSelection::new)
            .insert(name.into(), selection);
        self
    }
    pub fn select_field(mut self, name: impl Into<String>, selection: Selection) -> Self {
        self.select
            .get_or_insert_with(RelationSelection::new)
            .insert(name.into(), selection);
        self
    }
    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
    pub fn with_take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// What a caller asks for under one key of `include` or `select`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Flag(bool),
    Nested(Box<FindManyArgs>),
}

impl Selection {
    pub fn flag() -> Self {
        Selection::Flag(true)
    }
    pub fn nested(args: FindManyArgs) -> Self {
        Selection::Nested(Box::new(args))
    }
    pub fn is_requested(&self) -> bool {
        !matches!(self, Selection::Flag(false))
    }
}

// ------------- Ordering -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}
impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Asc }
    }
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Desc }
    }
}
impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.direction)?;
        map.end()
    }
}

// Accepts `{ "id": "asc" }` as well as `[{ "id": "asc" }, { "title": "desc" }]`.
fn deserialize_order_by<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<OrderBy>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let entries = match value {
        Value::Null => Vec::new(),
        Value::Array(list) => list,
        other => vec![other],
    };
    let mut order = Vec::new();
    for entry in entries {
        let map = match entry {
            Value::Object(map) => map,
            other => {
                return Err(D::Error::custom(format!("orderBy entries must be objects, got {other}")));
            }
        };
        for (field, direction) in map {
            let direction = Direction::deserialize(direction).map_err(D::Error::custom)?;
            order.push(OrderBy { field, direction });
        }
    }
    Ok(order)
}

// ------------- Filters -------------
/// A `where` predicate. The scoping engine only ever wraps a filter in an
/// [`Filter::And`]; interpreting it is the executor's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field { field: String, condition: Condition },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Not(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

impl Filter {
    pub fn field(field: impl Into<String>, condition: Condition) -> Self {
        Filter::Field { field: field.into(), condition }
    }
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Condition::Equals(value.into()))
    }
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::field(field, Condition::Equals(Value::Null))
    }
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::field(field, Condition::Not(Value::Null))
    }
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }
    pub fn to_json(&self) -> Value {
        match self {
            Filter::And(list) => json!({ "AND": list.iter().map(Filter::to_json).collect::<Vec<_>>() }),
            Filter::Or(list) => json!({ "OR": list.iter().map(Filter::to_json).collect::<Vec<_>>() }),
            Filter::Not(inner) => json!({ "NOT": inner.to_json() }),
            Filter::Field { field, condition } => {
                let mut map = Map::new();
                map.insert(field.clone(), condition.to_json());
                Value::Object(map)
            }
        }
    }
}

impl Condition {
    pub fn to_json(&self) -> Value {
        match self {
            Condition::Equals(value) => value.clone(),
            Condition::Not(value) => json!({ "not": value }),
            Condition::In(values) => json!({ "in": values }),
            Condition::NotIn(values) => json!({ "notIn": values }),
            Condition::Lt(value) => json!({ "lt": value }),
            Condition::Lte(value) => json!({ "lte": value }),
            Condition::Gt(value) => json!({ "gt": value }),
            Condition::Gte(value) => json!({ "gte": value }),
            Condition::Contains(text) => json!({ "contains": text }),
            Condition::StartsWith(text) => json!({ "startsWith": text }),
            Condition::EndsWith(text) => json!({ "endsWith": text }),
        }
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Value {
        filter.to_json()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl TryFrom<Value> for Filter {
    type Error = SoftscopeError;

    fn try_from(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(SoftscopeError::filter(format!("a where clause must be an object, got {other}")));
            }
        };
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "AND" => parts.push(Filter::And(filter_list(value)?)),
                "OR" => parts.push(Filter::Or(filter_list(value)?)),
                // NOT over a list holds when none of the listed filters hold
                "NOT" => parts.push(match value {
                    Value::Array(_) => Filter::Not(Box::new(Filter::Or(filter_list(value)?))),
                    other => Filter::Not(Box::new(Filter::try_from(other)?)),
                }),
                _ => parts.extend(field_filters(&key, value)?),
            }
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }
}

fn filter_list(value: Value) -> Result<Vec<Filter>> {
    match value {
        Value::Array(list) => list.into_iter().map(Filter::try_from).collect(),
        other => Ok(vec![Filter::try_from(other)?]),
    }
}

fn field_filters(field: &str, value: Value) -> Result<Vec<Filter>> {
    let operations = match value {
        Value::Object(operations) => operations,
        Value::Array(_) => {
            return Err(SoftscopeError::filter(format!(
                "field '{field}' cannot be compared to a list, use 'in'"
            )));
        }
        scalar => return Ok(vec![Filter::equals(field, scalar)]),
    };
    let mut filters = Vec::with_capacity(operations.len());
    for (operation, operand) in operations {
        let condition = match operation.as_str() {
            "equals" => Condition::Equals(scalar(field, &operation, operand)?),
            "not" => match operand {
                Value::Object(_) => {
                    let negated = field_filters(field, operand)?;
                    filters.push(Filter::Not(Box::new(Filter::And(negated))));
                    continue;
                }
                other => Condition::Not(scalar(field, &operation, other)?),
            },
            "in" => Condition::In(list(field, &operation, operand)?),
            "notIn" => Condition::NotIn(list(field, &operation, operand)?),
            "lt" => Condition::Lt(scalar(field, &operation, operand)?),
            "lte" => Condition::Lte(scalar(field, &operation, operand)?),
            "gt" => Condition::Gt(scalar(field, &operation, operand)?),
            "gte" => Condition::Gte(scalar(field, &operation, operand)?),
            "contains" => Condition::Contains(text(field, &operation, operand)?),
            "startsWith" => Condition::StartsWith(text(field, &operation, operand)?),
            "endsWith" => Condition::EndsWith(text(field, &operation, operand)?),
            _ => {
                return Err(SoftscopeError::filter(format!(
                    "unknown operation '{operation}' on field '{field}'"
                )));
            }
        };
        filters.push(Filter::field(field, condition));
    }
    Ok(filters)
}

fn scalar(field: &str, operation: &str, operand: Value) -> Result<Value> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(SoftscopeError::filter(format!(
            "'{operation}' on field '{field}' expects a scalar, got {operand}"
        ))),
        scalar => Ok(scalar),
    }
}

fn list(field: &str, operation: &str, operand: Value) -> Result<Vec<Value>> {
    match operand {
        Value::Array(values) => values
            .into_iter()
            .map(|value| scalar(field, operation, value))
            .collect(),
        other => Err(SoftscopeError::filter(format!(
            "'{operation}' on field '{field}' expects a list, got {other}"
        ))),
    }
}

fn text(field: &str, operation: &str, operand: Value) -> Result<String> {
    match operand {
        Value::String(text) => Ok(text),
        other => Err(SoftscopeError::filter(format!(
            "'{operation}' on field '{field}' expects a string, got {other}"
        ))),
    }
}
