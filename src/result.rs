//! Result rows - one typed scalar per row, owned by a processing step

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::property::{PropertyStore, property_owner};
use crate::step::StepId;
use crate::value::{ScalarValue, ValueCodec, ValueType};

/// Identity of a stored result row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultId(pub i64);

property_owner!(ResultId, "result_properties", "result_id");

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: ResultId,
    pub step: StepId,
    /// Free-form grouping label, e.g. "Energy"
    pub kind: String,
    pub value: ScalarValue,
}

/// Access to the `results` table
pub struct ResultStore<'a> {
    conn: &'a Connection,
}

impl<'a> ResultStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert one scalar result for `step`
    pub fn insert(&self, step: StepId, kind: &str, value: &ScalarValue) -> Result<ResultId> {
        let (value_type, text) = ValueCodec::encode_scalar(value);
        self.conn.execute(
            "INSERT INTO results (step_id, kind, value_text, value_type) VALUES (?1, ?2, ?3, ?4)",
            params![step.0, kind, text, value_type.as_str()],
        )?;
        let id = ResultId(self.conn.last_insert_rowid());
        tracing::debug!("Inserted result {} ({}: {}) for step {}", id, kind, value_type, step);
        Ok(id)
    }

    /// Get a result by id
    pub fn get(&self, id: ResultId) -> Result<Option<ResultRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, step_id, kind, value_text, value_type FROM results WHERE id = ?1",
                [id.0],
                raw_result,
            )
            .optional()?;
        row.map(RawResult::decode).transpose()
    }

    /// All results of `kind` owned by `step`, in insertion order
    pub fn find(&self, step: StepId, kind: &str) -> Result<Vec<ResultRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, step_id, kind, value_text, value_type FROM results
             WHERE step_id = ?1 AND kind = ?2 ORDER BY id",
        )?;
        let raw = stmt
            .query_map(params![step.0, kind], raw_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawResult::decode).collect()
    }

    /// Distinct result kinds stored for `step`
    pub fn kinds(&self, step: StepId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT kind FROM results WHERE step_id = ?1 ORDER BY kind")?;
        let kinds = stmt
            .query_map([step.0], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(kinds)
    }

    /// Count results, optionally for a single step
    pub fn count(&self, step: Option<StepId>) -> Result<usize> {
        let count: i64 = match step {
            Some(step) => self.conn.query_row(
                "SELECT COUNT(*) FROM results WHERE step_id = ?1",
                [step.0],
                |row| row.get(0),
            )?,
            None => self.conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    /// Properties attached to a result
    pub fn properties(&self, id: ResultId) -> PropertyStore<'a, ResultId> {
        PropertyStore::new(self.conn, id)
    }
}

/// Row as stored, before the value is decoded
struct RawResult {
    id: i64,
    step_id: i64,
    kind: String,
    value_text: String,
    value_type: String,
}

impl RawResult {
    fn decode(self) -> Result<ResultRow> {
        let value_type: ValueType = self.value_type.parse()?;
        let value = ValueCodec::decode(value_type, &self.value_text).map_err(|e| match e {
            Error::InvalidEncoding(msg) => {
                Error::InvalidEncoding(format!("result {}: {}", self.id, msg))
            }
            other => other,
        })?;
        Ok(ResultRow {
            id: ResultId(self.id),
            step: StepId(self.step_id),
            kind: self.kind,
            value,
        })
    }
}

fn raw_result(row: &rusqlite::Row) -> rusqlite::Result<RawResult> {
    Ok(RawResult {
        id: row.get(0)?,
        step_id: row.get(1)?,
        kind: row.get(2)?,
        value_text: row.get(3)?,
        value_type: row.get(4)?,
    })
}
