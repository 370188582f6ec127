use std::fmt;

use crate::model::Side;
use crate::value::FieldType;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (no job, zero chunk size, etc.).
    ConfigValidation(String),
    /// Key or compare field absent from one snapshot.
    SchemaMismatch { operation: &'static str, dataset: String, field: String },
    /// A value does not fit its declared column type.
    TypeMismatch { dataset: String, field: String, expected: FieldType, value: String },
    /// Unreadable cell or row in an input file. `row` is 1-based, header excluded.
    Parse { dataset: String, row: usize, column: String, message: String },
    /// A layer or feature whose geometry kind differs from the ranking job's.
    LayerKindMismatch { layer: String, expected: String, found: String },
    /// Grid with duplicate cell ids, missing ids or non-polygon cells.
    InvalidGrid(String),
    /// One side of a comparison has no dataset at all. Terminal for that entity only.
    MissingCounterpart { entity: String, side: Side },
    /// The geometry backend raised; message is passed through verbatim.
    Backend { operation: &'static str, message: String },
    /// IO error (file read/write, scratch directory).
    Io { operation: &'static str, message: String },
}

impl ReconError {
    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) | Self::ConfigValidation(_) => "config",
            Self::SchemaMismatch { operation, .. } => operation,
            Self::TypeMismatch { .. } | Self::Parse { .. } => "load",
            Self::LayerKindMismatch { .. } | Self::InvalidGrid(_) => "rank",
            Self::MissingCounterpart { .. } => "pair",
            Self::Backend { operation, .. } | Self::Io { operation, .. } => operation,
        }
    }

    pub fn io(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Io { operation, message: err.to_string() }
    }

    /// Whether the run can continue with the next entity.
    pub fn is_entity_local(&self) -> bool {
        matches!(self, Self::MissingCounterpart { .. })
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::SchemaMismatch { dataset, field, .. } => {
                write!(f, "dataset '{dataset}': missing field '{field}'")
            }
            Self::TypeMismatch { dataset, field, expected, value } => {
                write!(f, "dataset '{dataset}', field '{field}': '{value}' is not a {expected}")
            }
            Self::Parse { dataset, row, column, message } => {
                if column.is_empty() {
                    write!(f, "dataset '{dataset}', row {row}: {message}")
                } else {
                    write!(f, "dataset '{dataset}', row {row}, column '{column}': {message}")
                }
            }
            Self::LayerKindMismatch { layer, expected, found } => {
                write!(f, "layer '{layer}': expected {expected} geometry, found {found}")
            }
            Self::InvalidGrid(msg) => write!(f, "invalid grid: {msg}"),
            Self::MissingCounterpart { entity, side } => match side {
                Side::Old => write!(f, "'{entity}': no older dataset to compare"),
                Side::New => write!(f, "'{entity}': no newer dataset to compare"),
                Side::Both => write!(f, "'{entity}': datasets to compare are missing"),
            },
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
            Self::Io { message, .. } => write!(f, "IO error: {message}"),
        }
    }
}

impl std::error::Error for ReconError {}
