use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::MappingError,
    schema::{EntityDescriptor, Expression, IdStrategy},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    StartsWith,
    Contains,
    In,
    IsNull,
    IsNotNull,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equals => "=",
            ComparisonOperator::NotEquals => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::StartsWith => "STARTS WITH",
            ComparisonOperator::Contains => "CONTAINS",
            ComparisonOperator::In => "IN",
            ComparisonOperator::IsNull => "IS NULL",
            ComparisonOperator::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, ComparisonOperator::IsNull | ComparisonOperator::IsNotNull)
    }

    /// Evaluates the operator with Cypher's null semantics: any comparison against a
    /// missing property is false except `IS NULL`.
    pub fn evaluate(&self, actual: Option<&Value>, expected: &Value) -> bool {
        let actual = actual.filter(|value| !value.is_null());
        match (self, actual) {
            (ComparisonOperator::IsNull, found) => found.is_none(),
            (ComparisonOperator::IsNotNull, found) => found.is_some(),
            (_, None) => false,
            (ComparisonOperator::Equals, Some(found)) => values_equal(found, expected),
            (ComparisonOperator::NotEquals, Some(found)) => !values_equal(found, expected),
            (ComparisonOperator::LessThan, Some(found)) => {
                compare(found, expected) == Some(Ordering::Less)
            }
            (ComparisonOperator::LessThanOrEqual, Some(found)) => matches!(
                compare(found, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (ComparisonOperator::GreaterThan, Some(found)) => {
                compare(found, expected) == Some(Ordering::Greater)
            }
            (ComparisonOperator::GreaterThanOrEqual, Some(found)) => matches!(
                compare(found, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (ComparisonOperator::StartsWith, Some(found)) => match (found, expected) {
                (Value::String(a), Value::String(b)) => a.starts_with(b.as_str()),
                _ => false,
            },
            (ComparisonOperator::Contains, Some(found)) => match (found, expected) {
                (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
                _ => false,
            },
            (ComparisonOperator::In, Some(found)) => match expected {
                Value::Array(items) => items.iter().any(|item| values_equal(found, item)),
                _ => false,
            },
        }
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Predicate on one entity field, by field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

impl Filter {
    pub fn new<F: Into<String>>(field: F, operator: ComparisonOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq<F: Into<String>>(field: F, value: Value) -> Self {
        Self::new(field, ComparisonOperator::Equals, value)
    }

    pub fn is_null<F: Into<String>>(field: F) -> Self {
        Self::new(field, ComparisonOperator::IsNull, Value::Null)
    }
}

/// A filter resolved against a descriptor: the store expression to test and the
/// parameter carrying the comparison value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub expression: Expression,
    pub operator: ComparisonOperator,
    pub parameter: Option<String>,
}

impl Predicate {
    pub fn render(&self, variable: &str) -> String {
        let lhs = self.expression.render(variable);
        match &self.parameter {
            Some(parameter) => format!("{lhs} {} ${parameter}", self.operator.symbol()),
            None => format!("{lhs} {}", self.operator.symbol()),
        }
    }
}

/// Maps a field name to the store expression holding it.
pub(crate) fn field_expression(
    descriptor: &EntityDescriptor,
    field: &str,
) -> Result<Expression, MappingError> {
    if let Some(id) = descriptor.id().filter(|id| id.field == field) {
        return Ok(match &id.strategy {
            IdStrategy::Internal => Expression::InternalId,
            IdStrategy::Assigned { property, .. } => Expression::Property(property.clone()),
        });
    }
    descriptor
        .property_by_field(field)
        .map(|property| Expression::Property(property.stored_name.clone()))
        .ok_or_else(|| {
            MappingError::invalid_mapping(descriptor.name(), format!("no property field `{field}`"))
        })
}

/// Parameter name for the `index`-th filter on `field`; non-identifier characters become `_`.
pub(crate) fn parameter_name(field: &str, index: usize) -> String {
    let sanitized: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{sanitized}_{index}")
}
