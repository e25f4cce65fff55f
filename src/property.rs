//! Property Store - open-ended key/value tags on entities
//!
//! Each owning entity kind has its own `<owner>_properties` table with a
//! composite primary key `(owner_id, keyword)`:
//! - results -> result_properties(result_id, keyword, value)
//! - processing steps -> processing_step_properties(step_id, keyword, value)
//! - hosts -> host_properties(host_id, keyword, value)
//! - systems -> system_properties(system_id, keyword, value)
//!
//! Rows are deleted together with their owner through `ON DELETE CASCADE`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use crate::Result;

/// An entity id that can own properties.
pub trait PropertyOwner: Copy + Eq + Hash + fmt::Debug {
    /// Property table for this owner kind
    const TABLE: &'static str;
    /// Column in [`Self::TABLE`] referencing the owner
    const OWNER_COLUMN: &'static str;

    fn id(&self) -> i64;
    fn from_id(id: i64) -> Self;
}

/// Implement [`PropertyOwner`] for an `i64` id newtype.
macro_rules! property_owner {
    ($owner:ty, $table:literal, $column:literal) => {
        impl $crate::property::PropertyOwner for $owner {
            const TABLE: &'static str = $table;
            const OWNER_COLUMN: &'static str = $column;

            fn id(&self) -> i64 {
                self.0
            }

            fn from_id(id: i64) -> Self {
                Self(id)
            }
        }
    };
}
pub(crate) use property_owner;

/// How multiple key/value conditions combine in [`PropertyStore::any_matches`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every condition must hold
    All,
    /// At least one condition must hold
    Any,
}

/// Key/value properties of a single owner.
pub struct PropertyStore<'a, O: PropertyOwner> {
    conn: &'a Connection,
    owner: O,
}

impl<'a, O: PropertyOwner> PropertyStore<'a, O> {
    pub fn new(conn: &'a Connection, owner: O) -> Self {
        Self { conn, owner }
    }

    pub fn owner(&self) -> O {
        self.owner
    }

    /// Insert or overwrite a property
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} ({col}, keyword, value) VALUES (?1, ?2, ?3)
             ON CONFLICT({col}, keyword) DO UPDATE SET value = excluded.value",
            table = O::TABLE,
            col = O::OWNER_COLUMN,
        );
        self.conn.execute(&sql, params![self.owner.id(), key, value])?;
        Ok(())
    }

    /// Set several properties at once
    pub fn set_all<K, V, I>(&self, entries: I) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key.as_ref(), value.as_ref())?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT value FROM {} WHERE {} = ?1 AND keyword = ?2",
            O::TABLE,
            O::OWNER_COLUMN
        );
        self.conn
            .query_row(&sql, params![self.owner.id(), key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.all()?.into_keys().collect())
    }

    /// All properties of the owner, sorted by key
    pub fn all(&self) -> Result<BTreeMap<String, String>> {
        let sql = format!(
            "SELECT keyword, value FROM {} WHERE {} = ?1",
            O::TABLE,
            O::OWNER_COLUMN
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([self.owner.id()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            O::TABLE,
            O::OWNER_COLUMN
        );
        let count: i64 = self.conn.query_row(&sql, [self.owner.id()], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove a property; absent keys are ignored
    pub fn delete(&self, key: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND keyword = ?2",
            O::TABLE,
            O::OWNER_COLUMN
        );
        self.conn.execute(&sql, params![self.owner.id(), key])?;
        Ok(())
    }

    /// Filter `owners` down to those whose properties satisfy the given
    /// key/value equalities, combined according to `mode`.
    ///
    /// The result keeps the input order and drops duplicates. An empty
    /// condition list matches everything under `All` and nothing under `Any`.
    pub fn any_matches(
        conn: &Connection,
        owners: &[O],
        conditions: &[(&str, &str)],
        mode: MatchMode,
    ) -> Result<Vec<O>> {
        let conditions: BTreeSet<(&str, &str)> = conditions.iter().copied().collect();
        let mut seen = HashSet::new();
        let candidates: Vec<O> = owners.iter().copied().filter(|o| seen.insert(*o)).collect();

        if conditions.is_empty() {
            return Ok(match mode {
                MatchMode::All => candidates,
                MatchMode::Any => Vec::new(),
            });
        }

        let clause = vec!["(keyword = ? AND value = ?)"; conditions.len()].join(" OR ");
        let sql = format!(
            "SELECT {col}, COUNT(*) FROM {table} WHERE {clause} GROUP BY {col}",
            col = O::OWNER_COLUMN,
            table = O::TABLE,
        );
        let bindings: Vec<&dyn ToSql> = conditions
            .iter()
            .flat_map(|(k, v)| [k as &dyn ToSql, v as &dyn ToSql])
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(bindings.as_slice(), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<HashMap<i64, usize>>>()?;

        let required = match mode {
            MatchMode::All => conditions.len(),
            MatchMode::Any => 1,
        };

        Ok(candidates
            .into_iter()
            .filter(|o| hits.get(&o.id()).is_some_and(|n| *n >= required))
            .collect())
    }

    /// Every key used by any owner of this kind
    pub fn distinct_keys(conn: &Connection) -> Result<BTreeSet<String>> {
        let sql = format!("SELECT DISTINCT keyword FROM {}", O::TABLE);
        let mut stmt = conn.prepare(&sql)?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(keys)
    }

    /// Every value stored by owners of this kind, optionally for one key
    pub fn distinct_values(conn: &Connection, key: Option<&str>) -> Result<BTreeSet<String>> {
        let values = match key {
            Some(key) => {
                let sql = format!("SELECT DISTINCT value FROM {} WHERE keyword = ?1", O::TABLE);
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map([key], |row| row.get(0))?
                    .collect::<rusqlite::Result<BTreeSet<String>>>()?
            }
            None => {
                let sql = format!("SELECT DISTINCT value FROM {}", O::TABLE);
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<BTreeSet<String>>>()?
            }
        };
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{HostId, ReferenceStore};
    use crate::storage::Database;

    fn hosts(db: &Database, names: &[&str]) -> Vec<HostId> {
        let refs = ReferenceStore::new(db.connection());
        names.iter().map(|n| refs.get_or_create_host(n).unwrap().id).collect()
    }

    #[test]
    fn test_set_and_get() {
        let db = Database::open_in_memory().unwrap();
        let host = hosts(&db, &["orpheus42"])[0];
        let props = PropertyStore::new(db.connection(), host);

        assert!(props.is_empty().unwrap());
        props.set("cpu", "Intel Xeon").unwrap();

        assert_eq!(props.get("cpu").unwrap().as_deref(), Some("Intel Xeon"));
        assert!(props.contains("cpu").unwrap());
        assert!(!props.contains("gpu").unwrap());
        assert_eq!(props.get("gpu").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let host = hosts(&db, &["h"])[0];
        let props = PropertyStore::new(db.connection(), host);

        props.set("k", "v1").unwrap();
        props.set("k", "v2").unwrap();

        assert_eq!(props.len().unwrap(), 1);
        assert_eq!(props.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_keys_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let host = hosts(&db, &["h"])[0];
        let props = PropertyStore::new(db.connection(), host);
        props.set_all([("b", "2"), ("a", "1")]).unwrap();

        let keys: Vec<_> = props.keys().unwrap().into_iter().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        props.delete("a").unwrap();
        props.delete("missing").unwrap();
        assert_eq!(props.len().unwrap(), 1);
    }

    #[test]
    fn test_owners_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        let ids = hosts(&db, &["a", "b"]);
        PropertyStore::new(db.connection(), ids[0]).set("cpu", "x86").unwrap();

        assert!(PropertyStore::new(db.connection(), ids[1]).is_empty().unwrap());
    }

    #[test]
    fn test_any_matches_modes() {
        let db = Database::open_in_memory().unwrap();
        let ids = hosts(&db, &["a", "b", "c"]);
        let conn = db.connection();

        PropertyStore::new(conn, ids[0]).set_all([("cpu", "x86"), ("site", "north")]).unwrap();
        PropertyStore::new(conn, ids[1]).set_all([("cpu", "x86"), ("site", "south")]).unwrap();
        PropertyStore::new(conn, ids[2]).set_all([("cpu", "arm")]).unwrap();

        let both = PropertyStore::any_matches(
            conn,
            &ids,
            &[("cpu", "x86"), ("site", "north")],
            MatchMode::All,
        )
        .unwrap();
        assert_eq!(both, vec![ids[0]]);

        let either = PropertyStore::any_matches(
            conn,
            &ids,
            &[("cpu", "arm"), ("site", "north")],
            MatchMode::Any,
        )
        .unwrap();
        assert_eq!(either, vec![ids[0], ids[2]]);

        let subset =
            PropertyStore::any_matches(conn, &ids[1..], &[("cpu", "x86")], MatchMode::All)
                .unwrap();
        assert_eq!(subset, vec![ids[1]]);
    }

    #[test]
    fn test_any_matches_conflicting_values_for_one_key() {
        let db = Database::open_in_memory().unwrap();
        let ids = hosts(&db, &["a"]);
        let conn = db.connection();
        PropertyStore::new(conn, ids[0]).set("cpu", "x86").unwrap();

        let none = PropertyStore::any_matches(
            conn,
            &ids,
            &[("cpu", "x86"), ("cpu", "arm")],
            MatchMode::All,
        )
        .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_any_matches_empty_conditions() {
        let db = Database::open_in_memory().unwrap();
        let ids = hosts(&db, &["a", "b"]);
        let conn = db.connection();

        assert_eq!(PropertyStore::any_matches(conn, &ids, &[], MatchMode::All).unwrap(), ids);
        let any = PropertyStore::<HostId>::any_matches(conn, &ids, &[], MatchMode::Any).unwrap();
        assert!(any.is_empty());
    }

    #[test]
    fn test_distinct_keys_and_values() {
        let db = Database::open_in_memory().unwrap();
        let ids = hosts(&db, &["a", "b"]);
        let conn = db.connection();
        PropertyStore::new(conn, ids[0]).set_all([("cpu", "x86"), ("site", "north")]).unwrap();
        PropertyStore::new(conn, ids[1]).set_all([("cpu", "x86")]).unwrap();

        let keys = PropertyStore::<HostId>::distinct_keys(conn).unwrap();
        assert_eq!(keys.len(), 2);

        let cpus = PropertyStore::<HostId>::distinct_values(conn, Some("cpu")).unwrap();
        assert_eq!(cpus.into_iter().collect::<Vec<_>>(), vec!["x86".to_string()]);

        let all = PropertyStore::<HostId>::distinct_values(conn, None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
