//! Error taxonomy for the rewrite core.
//!
//! Every variant here is fatal: it bubbles to the top of the run and the
//! process exits non-zero. Advisory conditions are logged and counted in the
//! run report instead.

use thiserror::Error;

/// A regulatory record carries a value that cannot be mapped safely.
#[derive(Debug, Error)]
#[error("Schema: invalid value in record {record}, attribute: {field}, value: {value:?}")]
pub struct SchemaError {
    pub field: &'static str,
    pub value: String,
    pub record: i64,
}

impl SchemaError {
    pub fn new(field: &'static str, value: impl Into<String>, record: i64) -> Self {
        Self {
            field,
            value: value.into(),
            record,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Geometry: way {way} references node {node} without a known location")]
    MissingLocation { way: i64, node: i64 },

    #[error("Geometry: way {way} has fewer than two resolvable nodes")]
    DegenerateWay { way: i64 },

    #[error("Geometry: could not locate record geometry on way {way}")]
    UnresolvableFraction { way: i64 },

    #[error("Geometry: zone {zone} has an empty or degenerate ring")]
    MalformedRing { zone: i64 },

    #[error("Geometry: record {record} has a start time without a matching end time")]
    UnpairedTimeWindow { record: i64 },

    #[error("Geometry: record {record} has both single and grouped weekday flags")]
    ConflictingDays { record: i64 },
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Config: tag-clean key list is empty")]
    EmptyCleanKeys,

    #[error("Config: tag-clean polygon is invalid: {0}")]
    InvalidPolygon(String),

    #[error("Config: identifier seed for {0} must be positive")]
    InvalidSeed(&'static str),
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type RewriteResult<T> = Result<T, RewriteError>;
