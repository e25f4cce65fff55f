//! Reference entities - projects, authors, hosts, systems, methods, basis sets, keywords
//!
//! These are lookup records keyed by name. The `get_or_create_*`
//! helpers return the single existing row matching the natural key, insert
//! a new one when none exists, and refuse to guess when several match.

use rusqlite::{Connection, OptionalExtension, Params, params};
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::property::{PropertyStore, property_owner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuthorId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemId(pub i64);

property_owner!(HostId, "host_properties", "host_id");
property_owner!(SystemId, "system_properties", "system_id");

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub affiliation: Option<String>,
}

/// A machine a step ran on. `date` is the SQLite timestamp of registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub date: String,
}

/// A molecular system, optionally in a named variant (e.g. "distorted")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub name: String,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasisSet {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub name: String,
}

/// Find-or-insert access to the reference tables
pub struct ReferenceStore<'a> {
    conn: &'a Connection,
}

impl<'a> ReferenceStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run a lookup expected to yield at most one row
    fn find_unique<T, P, F>(&self, what: &str, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(Error::AmbiguousMatch(format!("{} matches {} rows", what, n))),
        }
    }

    // ========== Projects & Authors ==========

    /// Always insert a new project
    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        self.conn.execute(
            "INSERT INTO projects (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(Project {
            id: ProjectId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    pub fn get_or_create_project(&self, name: &str) -> Result<Project> {
        match self.find_project(name)? {
            Some(project) => Ok(project),
            None => self.create_project(name, None),
        }
    }

    pub fn find_project(&self, name: &str) -> Result<Option<Project>> {
        self.find_unique(
            &format!("project '{}'", name),
            "SELECT id, name, description FROM projects WHERE name = ?1",
            [name],
            row_to_project,
        )
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM projects WHERE id = ?1",
                [id.0],
                row_to_project,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare("SELECT id, name, description FROM projects ORDER BY id")?;
        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Delete a project together with its steps, their results and all
    /// properties attached to them
    pub fn delete_project(&self, id: ProjectId) -> Result<()> {
        let deleted = self.conn.execute("DELETE FROM projects WHERE id = ?1", [id.0])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("project {}", id)));
        }
        tracing::info!("Deleted project {} and everything it owns", id);
        Ok(())
    }

    /// Look up an author by name. Without an affiliation any affiliation
    /// matches; a newly created author gets the given affiliation.
    pub fn get_or_create_author(&self, name: &str, affiliation: Option<&str>) -> Result<Author> {
        let what = format!("author '{}'", name);
        let existing = match affiliation {
            Some(affiliation) => self.find_unique(
                &what,
                "SELECT id, name, affiliation FROM authors WHERE name = ?1 AND affiliation = ?2",
                params![name, affiliation],
                row_to_author,
            )?,
            None => self.find_unique(
                &what,
                "SELECT id, name, affiliation FROM authors WHERE name = ?1",
                [name],
                row_to_author,
            )?,
        };
        if let Some(author) = existing {
            return Ok(author);
        }

        self.conn.execute(
            "INSERT INTO authors (name, affiliation) VALUES (?1, ?2)",
            params![name, affiliation],
        )?;
        Ok(Author {
            id: AuthorId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            affiliation: affiliation.map(str::to_string),
        })
    }

    pub fn add_author(&self, project: ProjectId, author: AuthorId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO project_authors (project_id, author_id) VALUES (?1, ?2)",
            params![project.0, author.0],
        )?;
        Ok(())
    }

    pub fn authors(&self, project: ProjectId) -> Result<Vec<Author>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name, a.affiliation FROM authors a
             JOIN project_authors pa ON pa.author_id = a.id
             WHERE pa.project_id = ?1 ORDER BY a.name",
        )?;
        let authors = stmt
            .query_map([project.0], row_to_author)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(authors)
    }

    // ========== Hosts & Systems ==========

    pub fn get_or_create_host(&self, name: &str) -> Result<Host> {
        let select = "SELECT id, name, date FROM hosts WHERE name = ?1";
        let what = format!("host '{}'", name);
        if let Some(host) = self.find_unique(&what, select, [name], row_to_host)? {
            return Ok(host);
        }

        self.conn.execute("INSERT INTO hosts (name) VALUES (?1)", [name])?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row("SELECT id, name, date FROM hosts WHERE id = ?1", [id], row_to_host)
            .map_err(Into::into)
    }

    pub fn host_properties(&self, host: HostId) -> PropertyStore<'a, HostId> {
        PropertyStore::new(self.conn, host)
    }

    /// Look up a system by name. Without a variant any variant matches.
    pub fn get_or_create_system(&self, name: &str, variant: Option<&str>) -> Result<System> {
        let what = format!("system '{}'", name);
        let existing = match variant {
            Some(variant) => self.find_unique(
                &what,
                "SELECT id, name, variant FROM systems WHERE name = ?1 AND variant = ?2",
                params![name, variant],
                row_to_system,
            )?,
            None => self.find_unique(
                &what,
                "SELECT id, name, variant FROM systems WHERE name = ?1",
                [name],
                row_to_system,
            )?,
        };
        if let Some(system) = existing {
            return Ok(system);
        }

        self.conn.execute(
            "INSERT INTO systems (name, variant) VALUES (?1, ?2)",
            params![name, variant],
        )?;
        Ok(System {
            id: SystemId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            variant: variant.map(str::to_string),
        })
    }

    pub fn system_properties(&self, system: SystemId) -> PropertyStore<'a, SystemId> {
        PropertyStore::new(self.conn, system)
    }

    // ========== Methods, Basis Sets, Keywords ==========

    pub fn get_or_create_method(&self, name: &str) -> Result<Method> {
        let (id, name) = self.get_or_create_named("methods", name)?;
        Ok(Method { id, name })
    }

    pub fn get_or_create_basis_set(&self, name: &str) -> Result<BasisSet> {
        let (id, name) = self.get_or_create_named("basis_sets", name)?;
        Ok(BasisSet { id, name })
    }

    pub fn get_or_create_keyword(&self, name: &str) -> Result<Keyword> {
        let (id, name) = self.get_or_create_named("keywords", name)?;
        Ok(Keyword { id, name })
    }

    /// Find-or-insert on a `(id, name)` table
    fn get_or_create_named(&self, table: &'static str, name: &str) -> Result<(i64, String)> {
        let sql = format!("SELECT id, name FROM {} WHERE name = ?1", table);
        let what = format!("{} '{}'", table, name);
        let found = self.find_unique(&what, &sql, [name], |row| Ok((row.get(0)?, row.get(1)?)))?;
        if let Some(found) = found {
            return Ok(found);
        }

        self.conn
            .execute(&format!("INSERT INTO {} (name) VALUES (?1)", table), [name])?;
        Ok((self.conn.last_insert_rowid(), name.to_string()))
    }
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn row_to_author(row: &rusqlite::Row) -> rusqlite::Result<Author> {
    Ok(Author {
        id: AuthorId(row.get(0)?),
        name: row.get(1)?,
        affiliation: row.get(2)?,
    })
}

fn row_to_host(row: &rusqlite::Row) -> rusqlite::Result<Host> {
    Ok(Host {
        id: HostId(row.get(0)?),
        name: row.get(1)?,
        date: row.get(2)?,
    })
}

fn row_to_system(row: &rusqlite::Row) -> rusqlite::Result<System> {
    Ok(System {
        id: SystemId(row.get(0)?),
        name: row.get(1)?,
        variant: row.get(2)?,
    })
}
