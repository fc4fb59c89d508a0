//! Feature coercion
//!
//! Turns a validated observation into a [`FeatureRow`] in schema order.
//! Payload keys the schema does not know are ignored. Columns missing from
//! the payload (or sent as `null`) take the schema default when one is
//! declared and are otherwise passed on as [`FeatureValue::Missing`], leaving
//! imputation to the predictor.

use serde::Serialize;
use serde_json::Value;

use crate::error::CoercionError;
use crate::schema::{ColumnType, Schema};
use crate::validation::ValidatedObservation;

/// A single typed feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Integer(i64),
    Real(f64),
    Category(i64),
    Missing,
}

impl FeatureValue {
    /// Numeric view of the value; `None` when missing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Integer(v) | FeatureValue::Category(v) => Some(*v as f64),
            FeatureValue::Real(v) => Some(*v),
            FeatureValue::Missing => None,
        }
    }

    /// Category code (or plain integer) carried by the value
    pub fn as_category(&self) -> Option<i64> {
        match self {
            FeatureValue::Integer(v) | FeatureValue::Category(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

/// Schema-ordered typed values ready for the predictor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    values: Vec<FeatureValue>,
}

impl FeatureRow {
    pub fn new(values: Vec<FeatureValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&FeatureValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds feature rows against a fixed schema
pub struct FeatureCoercer;

impl FeatureCoercer {
    pub fn coerce(
        observation: &ValidatedObservation<'_>,
        schema: &Schema,
    ) -> Result<FeatureRow, CoercionError> {
        let mut values = Vec::with_capacity(schema.len());

        for column in schema.columns() {
            let value = match observation.data.get(&column.name) {
                None | Some(Value::Null) => match column.default {
                    Some(default) => from_default(column.column_type, default),
                    None => FeatureValue::Missing,
                },
                Some(raw) => cast(raw, column.column_type).ok_or_else(|| CoercionError {
                    field: column.name.clone(),
                    expected: column.column_type.as_str(),
                    actual: raw.to_string(),
                })?,
            };
            values.push(value);
        }

        Ok(FeatureRow::new(values))
    }
}

fn cast(raw: &Value, column_type: ColumnType) -> Option<FeatureValue> {
    match column_type {
        ColumnType::Integer => to_integer(raw).map(FeatureValue::Integer),
        ColumnType::CategoricalInteger => to_integer(raw).map(FeatureValue::Category),
        ColumnType::Real => to_real(raw).map(FeatureValue::Real),
    }
}

fn from_default(column_type: ColumnType, default: f64) -> FeatureValue {
    match column_type {
        ColumnType::Integer => FeatureValue::Integer(default as i64),
        ColumnType::CategoricalInteger => FeatureValue::Category(default as i64),
        ColumnType::Real => FeatureValue::Real(default),
    }
}

/// Integers, integral floats, booleans and integer strings
fn to_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers, booleans and finite numeric strings
fn to_real(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
