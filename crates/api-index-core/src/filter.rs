//! Metadata filters for vector queries and deletes.
//!
//! A [`MetadataFilter`] is a predicate over a record's flat [`Metadata`].
//! Filters are evaluated before similarity ranking, so only matching
//! records are ever candidates.
//!
//! # JSON dialect
//!
//! ```text
//! {"has_auth": true}                         field equals value
//! {"method": {"$ne": "GET"}}                 $eq, $ne, $in, $nin
//! {"$and": [{..}, {..}]}                     conjunction
//! {"$or": [{..}, {..}]}                      disjunction
//! {"method": "GET", "has_body": true}        several keys: conjunction
//! ```
//!
//! A field missing from a record fails `$eq` and `$in` and satisfies
//! `$ne` and `$nin`.

use serde_json::Value;
use thiserror::Error;

use crate::models::{Metadata, MetadataValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("empty filter expression")]
    Empty,
    #[error("unsupported filter operator '{0}'")]
    UnknownOperator(String),
    #[error("invalid filter value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("invalid filter assignment '{0}', expected key=value")]
    InvalidAssignment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Eq(String, MetadataValue),
    Ne(String, MetadataValue),
    In(String, Vec<MetadataValue>),
    Nin(String, Vec<MetadataValue>),
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        MetadataFilter::Eq(field.into(), value.into())
    }

    /// Evaluate the filter against one record's metadata.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::Eq(field, v) => metadata.get(field).is_some_and(|m| values_equal(m, v)),
            MetadataFilter::Ne(field, v) => !metadata.get(field).is_some_and(|m| values_equal(m, v)),
            MetadataFilter::In(field, vs) => metadata
                .get(field)
                .is_some_and(|m| vs.iter().any(|v| values_equal(m, v))),
            MetadataFilter::Nin(field, vs) => !metadata
                .get(field)
                .is_some_and(|m| vs.iter().any(|v| values_equal(m, v))),
            MetadataFilter::And(fs) => fs.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(fs) => fs.iter().any(|f| f.matches(metadata)),
        }
    }

    /// Parse the JSON filter dialect described in the module docs.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let obj = value.as_object().ok_or_else(|| FilterError::InvalidValue {
            field: "<root>".to_string(),
            reason: "filter must be a JSON object".to_string(),
        })?;
        if obj.is_empty() {
            return Err(FilterError::Empty);
        }

        let mut clauses = Vec::with_capacity(obj.len());
        for (key, v) in obj {
            clauses.push(match key.as_str() {
                "$and" => MetadataFilter::And(sub_filters(key, v)?),
                "$or" => MetadataFilter::Or(sub_filters(key, v)?),
                op if op.starts_with('$') => {
                    return Err(FilterError::UnknownOperator(op.to_string()));
                }
                field => field_clause(field, v)?,
            });
        }

        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            MetadataFilter::And(clauses)
        })
    }

    /// Parse a `key=value` assignment into an equality clause.
    ///
    /// `true`/`false` become booleans, integers become ints, and anything
    /// else is compared as a string.
    pub fn parse_assignment(s: &str) -> Result<Self, FilterError> {
        let (key, raw) = s
            .split_once('=')
            .ok_or_else(|| FilterError::InvalidAssignment(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(FilterError::InvalidAssignment(s.to_string()));
        }
        let raw = raw.trim();
        let value = match raw {
            "true" => MetadataValue::Bool(true),
            "false" => MetadataValue::Bool(false),
            _ => match raw.parse::<i64>() {
                Ok(i) => MetadataValue::Int(i),
                Err(_) => MetadataValue::Str(raw.to_string()),
            },
        };
        Ok(MetadataFilter::Eq(key.to_string(), value))
    }

    /// Combine `key=value` assignments into one conjunctive filter.
    /// Returns `None` when there are no assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Option<Self>, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut clauses = assignments
            .into_iter()
            .map(|a| Self::parse_assignment(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(MetadataFilter::And(clauses)),
        })
    }
}

/// Numbers compare across int/float. A string compares against a
/// non-string by the other value's rendered form, so `file_id=42` still
/// matches the stored string `"42"`.
fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a, b) {
        (MetadataValue::Int(x), MetadataValue::Float(y))
        | (MetadataValue::Float(y), MetadataValue::Int(x)) => (*x as f64) == *y,
        (MetadataValue::Str(_), MetadataValue::Str(_)) => a == b,
        (MetadataValue::Str(s), other) | (other, MetadataValue::Str(s)) => *s == other.to_string(),
        _ => a == b,
    }
}

fn sub_filters(key: &str, v: &Value) -> Result<Vec<MetadataFilter>, FilterError> {
    let items = v.as_array().ok_or_else(|| FilterError::InvalidValue {
        field: key.to_string(),
        reason: "expected an array of filters".to_string(),
    })?;
    if items.is_empty() {
        return Err(FilterError::Empty);
    }
    items.iter().map(MetadataFilter::from_json).collect()
}

fn field_clause(field: &str, v: &Value) -> Result<MetadataFilter, FilterError> {
    let Some(ops) = v.as_object() else {
        return Ok(MetadataFilter::Eq(field.to_string(), scalar(field, v)?));
    };
    if ops.len() != 1 {
        return Err(FilterError::InvalidValue {
            field: field.to_string(),
            reason: "operator object must have exactly one operator".to_string(),
        });
    }
    let (op, arg) = ops.iter().next().ok_or(FilterError::Empty)?;
    let field = field.to_string();
    Ok(match op.as_str() {
        "$eq" => MetadataFilter::Eq(field.clone(), scalar(&field, arg)?),
        "$ne" => MetadataFilter::Ne(field.clone(), scalar(&field, arg)?),
        "$in" => MetadataFilter::In(field.clone(), scalar_list(&field, arg)?),
        "$nin" => MetadataFilter::Nin(field.clone(), scalar_list(&field, arg)?),
        other => return Err(FilterError::UnknownOperator(other.to_string())),
    })
}

fn scalar(field: &str, v: &Value) -> Result<MetadataValue, FilterError> {
    match v {
        Value::Bool(b) => Ok(MetadataValue::Bool(*b)),
        Value::String(s) => Ok(MetadataValue::Str(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(MetadataValue::Int)
            .or_else(|| n.as_f64().map(MetadataValue::Float))
            .ok_or_else(|| FilterError::InvalidValue {
                field: field.to_string(),
                reason: format!("number out of range: {}", n),
            }),
        other => Err(FilterError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a string, number, or boolean, got {}", other),
        }),
    }
}

fn scalar_list(field: &str, v: &Value) -> Result<Vec<MetadataValue>, FilterError> {
    v.as_array()
        .ok_or_else(|| FilterError::InvalidValue {
            field: field.to_string(),
            reason: "expected an array".to_string(),
        })?
        .iter()
        .map(|item| scalar(field, item))
        .collect()
}
