//! Processing steps - the unit of computation that owns results
//!
//! A step belongs to exactly one project and may reference the host it ran
//! on and the system it was computed for. Dependencies between steps are
//! handled by [`StepGraph`](crate::graph::StepGraph).

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::property::{PropertyStore, property_owner};
use crate::reference::{HostId, Keyword, ProjectId, ReferenceStore, SystemId};

/// Identity of a processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub i64);

property_owner!(StepId, "processing_step_properties", "step_id");

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted processing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub id: StepId,
    /// What kind of computation this was, e.g. "RHF" or "CCSD"
    pub kind: String,
    pub project: ProjectId,
    pub host: Option<HostId>,
    pub system: Option<SystemId>,
    /// Where the raw program output lives
    pub output_path: Option<String>,
}

/// Description of a step to be created
#[derive(Debug, Clone)]
pub struct NewStep {
    pub kind: String,
    pub project: ProjectId,
    pub host: Option<HostId>,
    pub system: Option<SystemId>,
    pub output_path: Option<String>,
}

impl NewStep {
    pub fn new(kind: impl Into<String>, project: ProjectId) -> Self {
        Self {
            kind: kind.into(),
            project,
            host: None,
            system: None,
            output_path: None,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_host(mut self, host: HostId) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_system(mut self, system: SystemId) -> Self {
        self.system = Some(system);
        self
    }
}

/// Access to the `processing_steps` table
pub struct StepStore<'a> {
    conn: &'a Connection,
}

impl<'a> StepStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new step
    pub fn create(&self, step: &NewStep) -> Result<ProcessingStep> {
        self.conn.execute(
            "INSERT INTO processing_steps (kind, project_id, host_id, system_id, output_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                step.kind,
                step.project.0,
                step.host.map(|h| h.0),
                step.system.map(|s| s.0),
                step.output_path,
            ],
        )?;
        let id = StepId(self.conn.last_insert_rowid());
        tracing::debug!("Created step {} ({}) in project {}", id, step.kind, step.project);

        Ok(ProcessingStep {
            id,
            kind: step.kind.clone(),
            project: step.project,
            host: step.host,
            system: step.system,
            output_path: step.output_path.clone(),
        })
    }

    /// Get a step by id
    pub fn get(&self, id: StepId) -> Result<Option<ProcessingStep>> {
        self.conn
            .query_row(
                "SELECT id, kind, project_id, host_id, system_id, output_path FROM processing_steps WHERE id = ?1",
                [id.0],
                row_to_step,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Check whether a step exists
    pub fn exists(&self, id: StepId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM processing_steps WHERE id = ?1)",
            [id.0],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Find steps of a project by kind
    pub fn find_by_kind(&self, project: ProjectId, kind: &str) -> Result<Vec<ProcessingStep>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, project_id, host_id, system_id, output_path FROM processing_steps
             WHERE project_id = ?1 AND kind = ?2 ORDER BY id",
        )?;
        let steps = stmt
            .query_map(params![project.0, kind], row_to_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    /// All steps of a project, ordered by id
    pub fn list_for_project(&self, project: ProjectId) -> Result<Vec<ProcessingStep>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, project_id, host_id, system_id, output_path FROM processing_steps
             WHERE project_id = ?1 ORDER BY id",
        )?;
        let steps = stmt
            .query_map([project.0], row_to_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    /// Count all steps
    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM processing_steps", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Tag a step with a keyword, creating the keyword if needed
    pub fn add_keyword(&self, step: StepId, name: &str) -> Result<Keyword> {
        let keyword = ReferenceStore::new(self.conn).get_or_create_keyword(name)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO processing_step_keywords (step_id, keyword_id) VALUES (?1, ?2)",
            params![step.0, keyword.id],
        )?;
        Ok(keyword)
    }

    /// Keywords attached to a step, sorted by name
    pub fn keywords(&self, step: StepId) -> Result<Vec<Keyword>> {
        let mut stmt = self.conn.prepare(
            "SELECT k.id, k.name FROM keywords k
             JOIN processing_step_keywords sk ON sk.keyword_id = k.id
             WHERE sk.step_id = ?1 ORDER BY k.name",
        )?;
        let keywords = stmt
            .query_map([step.0], |row| Ok(Keyword { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keywords)
    }

    /// Free-form properties of a step
    pub fn properties(&self, step: StepId) -> PropertyStore<'a, StepId> {
        PropertyStore::new(self.conn, step)
    }
}

/// Helper to convert a row to a ProcessingStep
fn row_to_step(row: &rusqlite::Row) -> rusqlite::Result<ProcessingStep> {
    Ok(ProcessingStep {
        id: StepId(row.get(0)?),
        kind: row.get(1)?,
        project: ProjectId(row.get(2)?),
        host: row.get::<_, Option<i64>>(3)?.map(HostId),
        system: row.get::<_, Option<i64>>(4)?.map(SystemId),
        output_path: row.get(5)?,
    })
}
