//! # data-manager - Relational store for scientific computation results
//!
//! Persists the outcome of computational workflows in SQLite.
//!
//! data-manager provides:
//! - Typed scalar results (integer, float, text) with a canonical text codec
//! - Lists and matrices flattened into addressable result rows and rebuilt exactly
//! - Free-form key/value properties on results, steps, hosts and systems
//! - A dependency DAG between processing steps with cascade deletion
//! - Find-or-insert helpers for projects, authors, hosts, systems and friends

pub mod value;
pub mod property;
pub mod result;
pub mod collection;
pub mod step;
pub mod graph;
pub mod reference;
pub mod storage;
pub mod ui;
pub mod output;
pub mod config;

// Re-exports for convenient access
pub use value::{Datum, ScalarValue, ValueCodec, ValueType};
pub use property::{MatchMode, PropertyOwner, PropertyStore};
pub use result::{ResultId, ResultRow, ResultStore};
pub use collection::{Collection, CollectionSerializer, Shape};
pub use step::{NewStep, ProcessingStep, StepId, StepStore};
pub use graph::{DependencyGraph, StepGraph};
pub use reference::{ProjectId, ReferenceStore};
pub use storage::Database;

/// Result type alias for data-manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for data-manager operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    #[error("Irregular collection shape: {0}")]
    IrregularShape(String),

    #[error("Unsupported dimensionality: {0}")]
    UnsupportedDimensionality(String),

    #[error("Inconsistent collection rows: {0}")]
    InconsistentShape(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Step {0} cannot depend on itself")]
    SelfDependency(i64),

    #[error("Dependency {preceding} -> {dependent} would create a cycle")]
    Cycle { preceding: i64, dependent: i64 },

    #[error("Ambiguous match: {0}")]
    AmbiguousMatch(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    #[error("Invalid database path: {0}")]
    InvalidDatabasePath(String),

    #[error("Database does not exist: {0}")]
    DatabaseMissing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
