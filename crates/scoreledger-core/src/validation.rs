//! Request validation
//!
//! A score request is checked by an ordered list of rules. Evaluation stops
//! at the first rule that fails and that rule's field is reported; violations
//! are never aggregated. The order below is part of the observable contract:
//!
//! 1. `observation_id` present (and an integer)
//! 2. `data` present (and an object)
//! 3. `age` present
//! 4. `bloodpressure` absent
//! 5. `sex` integer-convertible and at most 2
//! 6. `ca` an integer
//! 7. `age` an integer in `[0, 120]`
//! 8. `trestbps` a number in `[40, 200]`
//! 9. `oldpeak` a number no greater than 10
//!
//! Validation is pure: the payload is returned untouched on success.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Why a field failed validation
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// Required field is absent
    Missing,
    /// Field is present but must not be
    Forbidden,
    /// Field must be a JSON object
    NotAnObject,
    /// Field has the wrong type; carries the offending value as JSON
    WrongType(String),
    /// Field is outside its allowed domain; carries the offending value
    OutOfRange(String),
}

impl Reason {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Missing => "missing",
            Reason::Forbidden => "forbidden",
            Reason::NotAnObject => "not_an_object",
            Reason::WrongType(_) => "wrong_type",
            Reason::OutOfRange(_) => "out_of_range",
        }
    }

    /// Offending literal, if the reason carries one
    pub fn literal(&self) -> Option<&str> {
        match self {
            Reason::WrongType(v) | Reason::OutOfRange(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.literal() {
            Some(literal) => write!(f, "{} ({})", self.code(), literal),
            None => f.write_str(self.code()),
        }
    }
}

/// First violation found in a request
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid field '{field}': {reason}")]
pub struct ValidationError {
    /// `observation_id` as sent by the client, `null` when absent
    pub observation_id: Value,
    pub field: String,
    pub reason: Reason,
}

impl ValidationError {
    pub fn new(observation_id: Value, field: impl Into<String>, reason: Reason) -> Self {
        Self {
            observation_id,
            field: field.into(),
            reason,
        }
    }
}

/// A request that passed every rule
#[derive(Debug, Clone, Copy)]
pub struct ValidatedObservation<'a> {
    pub observation_id: i64,
    pub data: &'a Map<String, Value>,
}

/// A single check over the `data` object of a request
pub trait Rule: Send + Sync {
    /// Field this rule reports on failure
    fn field(&self) -> &str;

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason>;
}

/// Field must be present
pub struct Required(pub &'static str);

impl Rule for Required {
    fn field(&self) -> &str {
        self.0
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        if data.contains_key(self.0) {
            Ok(())
        } else {
            Err(Reason::Missing)
        }
    }
}

/// Field must be absent
pub struct Forbidden(pub &'static str);

impl Rule for Forbidden {
    fn field(&self) -> &str {
        self.0
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        if data.contains_key(self.0) {
            Err(Reason::Forbidden)
        } else {
            Ok(())
        }
    }
}

/// Field must convert to an integer no greater than `max`
///
/// Conversion is lenient: floats truncate toward zero, booleans count as
/// 0/1 and strings holding an integer are parsed.
pub struct ConvertibleIntAtMost {
    pub field: &'static str,
    pub max: i64,
}

impl Rule for ConvertibleIntAtMost {
    fn field(&self) -> &str {
        self.field
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        let value = data.get(self.field).ok_or(Reason::Missing)?;
        let n = convert_to_int(value).ok_or_else(|| Reason::WrongType(value.to_string()))?;
        if n > self.max {
            return Err(Reason::OutOfRange(n.to_string()));
        }
        Ok(())
    }
}

/// Field must be a JSON integer
pub struct StrictInt(pub &'static str);

impl Rule for StrictInt {
    fn field(&self) -> &str {
        self.0
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        let value = data.get(self.0).ok_or(Reason::Missing)?;
        if value.as_i64().is_some() {
            Ok(())
        } else {
            Err(Reason::WrongType(value.to_string()))
        }
    }
}

/// Field must be a JSON integer within `[min, max]`
pub struct IntInRange {
    pub field: &'static str,
    pub min: i64,
    pub max: i64,
}

impl Rule for IntInRange {
    fn field(&self) -> &str {
        self.field
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        let value = data.get(self.field).ok_or(Reason::Missing)?;
        let n = value
            .as_i64()
            .ok_or_else(|| Reason::WrongType(value.to_string()))?;
        if n < self.min || n > self.max {
            return Err(Reason::OutOfRange(n.to_string()));
        }
        Ok(())
    }
}

/// Field must be a JSON number within optional bounds (inclusive)
pub struct NumberInRange {
    pub field: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Rule for NumberInRange {
    fn field(&self) -> &str {
        self.field
    }

    fn check(&self, data: &Map<String, Value>) -> Result<(), Reason> {
        let value = data.get(self.field).ok_or(Reason::Missing)?;
        let n = value
            .as_f64()
            .ok_or_else(|| Reason::WrongType(value.to_string()))?;
        let below = self.min.is_some_and(|min| n < min);
        let above = self.max.is_some_and(|max| n > max);
        if below || above {
            return Err(Reason::OutOfRange(value.to_string()));
        }
        Ok(())
    }
}

/// Validates score requests against the fixed rule sequence
pub struct RequestValidator {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(Required("age")),
                Box::new(Forbidden("bloodpressure")),
                Box::new(ConvertibleIntAtMost { field: "sex", max: 2 }),
                Box::new(StrictInt("ca")),
                Box::new(IntInRange {
                    field: "age",
                    min: 0,
                    max: 120,
                }),
                Box::new(NumberInRange {
                    field: "trestbps",
                    min: Some(40.0),
                    max: Some(200.0),
                }),
                Box::new(NumberInRange {
                    field: "oldpeak",
                    min: None,
                    max: Some(10.0),
                }),
            ],
        }
    }

    /// Fields checked by the data rules, in evaluation order
    pub fn rule_fields(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.field()).collect()
    }

    /// Check a raw request, stopping at the first violation
    pub fn validate<'a>(&self, raw: &'a Value) -> Result<ValidatedObservation<'a>, ValidationError> {
        let (observation_id, data) = envelope(raw)?;

        for rule in &self.rules {
            if let Err(reason) = rule.check(data) {
                return Err(ValidationError::new(
                    Value::from(observation_id),
                    rule.field(),
                    reason,
                ));
            }
        }

        Ok(ValidatedObservation {
            observation_id,
            data,
        })
    }
}

/// Extract `observation_id` and the `data` object
fn envelope(raw: &Value) -> Result<(i64, &Map<String, Value>), ValidationError> {
    let observation_id = require_observation_id(raw)?;
    let echoed = Value::from(observation_id);

    let data = raw
        .get("data")
        .ok_or_else(|| ValidationError::new(echoed.clone(), "data", Reason::Missing))?
        .as_object()
        .ok_or_else(|| ValidationError::new(echoed, "data", Reason::NotAnObject))?;

    Ok((observation_id, data))
}

/// Extract an integer `observation_id` from a request object
pub(crate) fn require_observation_id(raw: &Value) -> Result<i64, ValidationError> {
    let value = raw
        .get("observation_id")
        .ok_or_else(|| ValidationError::new(Value::Null, "observation_id", Reason::Missing))?;
    value.as_i64().ok_or_else(|| {
        ValidationError::new(
            value.clone(),
            "observation_id",
            Reason::WrongType(value.to_string()),
        )
    })
}

fn convert_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
