//! Schema registry
//!
//! The schema is the ordered column list and per-column type map the
//! predictor was trained against. It is loaded once at startup from two JSON
//! artifacts and never changes afterwards, so it is shared as a plain
//! `Arc<Schema>` with no locking.
//!
//! `columns.json` is an array of column names. `dtypes.json` maps each column
//! to either a type name or an object carrying a type and a default:
//!
//! ```json
//! { "age": "int64", "oldpeak": "float64", "thal": {"type": "category", "default": 2} }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::SchemaError;

/// Primitive type expected for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    Integer,
    Real,
    CategoricalInteger,
}

impl ColumnType {
    /// Parse a type name, accepting the common dataframe spellings
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "int64" | "int32" => Some(ColumnType::Integer),
            "real" | "float" | "float64" | "float32" | "number" => Some(ColumnType::Real),
            "categorical-integer" | "category" | "categorical" => {
                Some(ColumnType::CategoricalInteger)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::CategoricalInteger => "categorical-integer",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single schema column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Value used when a payload omits the column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }
}

/// Immutable ordered schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column in schema order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Entry of the type map artifact
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DtypeSpec {
    Name(String),
    Detailed {
        #[serde(rename = "type")]
        dtype: String,
        #[serde(default)]
        default: Option<f64>,
    },
}

/// Loads the schema from startup artifacts
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Load column order and type map from their JSON artifacts
    ///
    /// Any failure here is fatal to startup: the process must not serve
    /// without a valid schema.
    pub fn load(
        columns_path: impl AsRef<Path>,
        dtypes_path: impl AsRef<Path>,
    ) -> Result<Schema, SchemaError> {
        let columns: Vec<String> = read_json(columns_path.as_ref())?;
        let dtypes: HashMap<String, DtypeSpec> = read_json(dtypes_path.as_ref())?;

        let mut typed = Vec::with_capacity(columns.len());
        let mut remaining = dtypes;
        for name in columns {
            let spec = remaining
                .remove(&name)
                .ok_or_else(|| SchemaError::MissingType(name.clone()))?;
            let (dtype, default) = match spec {
                DtypeSpec::Name(dtype) => (dtype, None),
                DtypeSpec::Detailed { dtype, default } => (dtype, default),
            };
            let column_type =
                ColumnType::parse(&dtype).ok_or_else(|| SchemaError::UnsupportedType {
                    column: name.clone(),
                    dtype: dtype.clone(),
                })?;
            typed.push(Column {
                name,
                column_type,
                default,
            });
        }

        if let Some(unknown) = remaining.into_keys().min() {
            return Err(SchemaError::UnknownColumn(unknown));
        }

        let schema = Self::from_parts(typed)?;
        tracing::info!(columns = schema.len(), "Schema loaded");
        Ok(schema)
    }

    /// Build a schema from already-typed columns
    pub fn from_parts(columns: Vec<Column>) -> Result<Schema, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Schema { columns })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SchemaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
