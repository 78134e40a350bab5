// used to validate identifiers before they are spliced into statements
use lazy_static::lazy_static;
use regex::Regex;

// used for persistence
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::args::{Condition, Direction, Filter, OrderBy};
use crate::datatype::ScalarType;
use crate::error::{Result, SoftscopeError};
use crate::schema::EntityModel;

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid");
}

pub(crate) fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SoftscopeError::InvalidIdentifier(name.to_string()))
    }
}

pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

pub(crate) fn column_list(entity: &EntityModel) -> String {
    entity
        .scalar_fields()
        .map(|(field, _)| quote(&field.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when `filter` pins down at most one row: an equality on an id or
/// unique field, possibly AND-ed with further conditions.
pub(crate) fn is_unique_selector(entity: &EntityModel, filter: &Filter) -> bool {
    match filter {
        Filter::Field { field, condition: Condition::Equals(value) } => {
            !value.is_null() && entity.get(field).is_some_and(|f| f.is_id || f.is_unique)
        }
        Filter::And(list) => list.iter().any(|f| is_unique_selector(entity, f)),
        _ => false,
    }
}

/// Accumulates the positional parameters of one statement while its clauses
/// are rendered left to right.
pub(crate) struct SqlBuilder<'e> {
    entity: &'e EntityModel,
    params: Vec<SqlValue>,
}

impl<'e> SqlBuilder<'e> {
    pub fn new(entity: &'e EntityModel) -> Self {
        Self { entity, params: Vec::new() }
    }
    pub fn into_params(self) -> Vec<SqlValue> {
        self.params
    }

    fn scalar(&self, field: &str) -> Result<ScalarType> {
        self.entity.scalar_type(field).ok_or_else(|| {
            SoftscopeError::Execution(format!(
                "'{field}' is not a scalar field of {}",
                self.entity.name
            ))
        })
    }

    pub fn bind(&mut self, field: &str, value: &Value) -> Result<&'static str> {
        let ty = self.scalar(field)?;
        self.params.push(ty.to_sql(field, value)?);
        Ok("?")
    }

    pub fn assignments(&mut self, data: &serde_json::Map<String, Value>) -> Result<String> {
        let mut parts = Vec::with_capacity(data.len());
        for (field, value) in data {
            let placeholder = self.bind(field, value)?;
            parts.push(format!("{} = {placeholder}", quote(field)));
        }
        Ok(parts.join(", "))
    }

    pub fn filter(&mut self, filter: &Filter) -> Result<String> {
        match filter {
            Filter::And(list) if list.is_empty() => Ok("1 = 1".to_string()),
            Filter::Or(list) if list.is_empty() => Ok("1 = 0".to_string()),
            Filter::And(list) => self.junction(list, " and "),
            Filter::Or(list) => self.junction(list, " or "),
            Filter::Not(inner) => Ok(format!("not ({})", self.filter(inner)?)),
            Filter::Field { field, condition } => self.condition(field, condition),
        }
    }

    fn junction(&mut self, list: &[Filter], separator: &str) -> Result<String> {
        let mut parts = Vec::with_capacity(list.len());
        for filter in list {
            parts.push(self.filter(filter)?);
        }
        Ok(format!("({})", parts.join(separator)))
    }

    fn condition(&mut self, field: &str, condition: &Condition) -> Result<String> {
        let column = quote(field);
        let clause = match condition {
            Condition::Equals(Value::Null) => {
                self.scalar(field)?;
                format!("{column} is null")
            }
            Condition::Not(Value::Null) => {
                self.scalar(field)?;
                format!("{column} is not null")
            }
            Condition::Equals(value) => format!("{column} = {}", self.bind(field, value)?),
            Condition::Not(value) => format!("{column} <> {}", self.bind(field, value)?),
            Condition::Lt(value) => format!("{column} < {}", self.bind(field, value)?),
            Condition::Lte(value) => format!("{column} <= {}", self.bind(field, value)?),
            Condition::Gt(value) => format!("{column} > {}", self.bind(field, value)?),
            Condition::Gte(value) => format!("{column} >= {}", self.bind(field, value)?),
            Condition::In(values) if values.is_empty() => {
                self.scalar(field)?;
                "1 = 0".to_string()
            }
            Condition::NotIn(values) if values.is_empty() => {
                self.scalar(field)?;
                "1 = 1".to_string()
            }
            Condition::In(values) => format!("{column} in ({})", self.bind_all(field, values)?),
            Condition::NotIn(values) => {
                format!("{column} not in ({})", self.bind_all(field, values)?)
            }
            Condition::Contains(text) => self.like(field, &format!("%{}%", escape_like(text)))?,
            Condition::StartsWith(text) => self.like(field, &format!("{}%", escape_like(text)))?,
            Condition::EndsWith(text) => self.like(field, &format!("%{}", escape_like(text)))?,
        };
        Ok(clause)
    }

    fn bind_all(&mut self, field: &str, values: &[Value]) -> Result<String> {
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            placeholders.push(self.bind(field, value)?);
        }
        Ok(placeholders.join(", "))
    }

    fn like(&mut self, field: &str, pattern: &str) -> Result<String> {
        if self.scalar(field)? != ScalarType::String {
            return Err(SoftscopeError::Execution(format!(
                "text matching needs a String field, '{field}' of {} is not one",
                self.entity.name
            )));
        }
        self.params.push(SqlValue::Text(pattern.to_string()));
        Ok(format!("{} like ? escape '\\'", quote(field)))
    }

    pub fn order(&self, order: &[OrderBy]) -> Result<String> {
        let mut parts = Vec::with_capacity(order.len());
        for entry in order {
            self.scalar(&entry.field)?;
            let direction = match entry.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            parts.push(format!("{} {direction}", quote(&entry.field)));
        }
        Ok(parts.join(", "))
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
