//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - processing_steps(id, kind, project_id, host_id, system_id, output_path)
//! - processing_step_hierarchy(preceding_id, dependent_id)
//! - results(id, step_id, kind, value_text, value_type)
//! - *_properties(owner_id, keyword, value) for results, steps, hosts, systems
//! - reference tables: projects, authors, hosts, systems, methods, basis_sets, keywords

pub mod schema;
pub mod sqlite;

pub use sqlite::{Database, DbStats, OpenOptions};
