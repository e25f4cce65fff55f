//! Collection Serializer - lists and matrices stored as scalar result rows
//!
//! A collection of N (or N x M) scalars becomes N (or N x M) rows in
//! `results`, one per element. Each row carries structural properties
//! describing where it belongs:
//!
//! | key                        | List      | Matrix    |
//! |----------------------------|-----------|-----------|
//! | `kind`                     | `List`    | `Matrix`  |
//! | `indexing`                 | `1-based` | `1-based` |
//! | `index`                    | i + 1     |           |
//! | `row`, `column`            |           | r + 1, c + 1 |
//! | `original_collection_type` | `list`    | `list`    |
//! | `total_dimension`          | `N`       | `N,M`     |
//!
//! These strings are part of the on-disk format and must not change.
//! User properties on the same rows must use other keys.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::result::{ResultId, ResultRow, ResultStore};
use crate::step::StepId;
use crate::value::{Datum, ScalarValue};

pub const KEY_KIND: &str = "kind";
pub const KEY_INDEXING: &str = "indexing";
pub const KEY_INDEX: &str = "index";
pub const KEY_ROW: &str = "row";
pub const KEY_COLUMN: &str = "column";
pub const KEY_ORIGINAL_COLLECTION_TYPE: &str = "original_collection_type";
pub const KEY_TOTAL_DIMENSION: &str = "total_dimension";

/// Property keys reserved for collection structure
pub const STRUCTURAL_KEYS: &[&str] = &[
    KEY_KIND,
    KEY_INDEXING,
    KEY_INDEX,
    KEY_ROW,
    KEY_COLUMN,
    KEY_ORIGINAL_COLLECTION_TYPE,
    KEY_TOTAL_DIMENSION,
];

pub const ONE_BASED: &str = "1-based";
pub const ORIGINAL_COLLECTION_TYPE: &str = "list";

/// Declared shape of a stored collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    List,
    Matrix,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::List => "List",
            Shape::Matrix => "Matrix",
        }
    }
}

impl FromStr for Shape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "List" => Ok(Shape::List),
            "Matrix" => Ok(Shape::Matrix),
            _ => Err(Error::InconsistentShape(format!("unknown collection kind '{}'", s))),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A one- or two-dimensional collection of scalars.
///
/// `None` marks an element that has no stored row. It is distinct from any
/// stored value, including empty text and zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Collection {
    List(Vec<Option<ScalarValue>>),
    Matrix(Vec<Vec<Option<ScalarValue>>>),
}

impl Collection {
    /// A list with every element present
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Collection::List(items.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn shape(&self) -> Shape {
        match self {
            Collection::List(_) => Shape::List,
            Collection::Matrix(_) => Shape::Matrix,
        }
    }

    /// Number of stored (non-missing) elements
    pub fn present(&self) -> usize {
        match self {
            Collection::List(items) => items.iter().flatten().count(),
            Collection::Matrix(rows) => rows.iter().map(|r| r.iter().flatten().count()).sum(),
        }
    }

    /// Classify a producer value as a list or a rectangular matrix
    pub fn from_datum(datum: &Datum) -> Result<Self> {
        let items = match datum {
            Datum::Scalar(_) => {
                return Err(Error::UnsupportedDimensionality("a scalar is not a collection".into()));
            }
            Datum::Sequence(items) => items,
        };
        if items.is_empty() {
            return Err(Error::EmptyCollection("collection has no elements".into()));
        }

        if items.iter().all(Datum::is_scalar) {
            let list = items.iter().map(|d| d.as_scalar().cloned()).collect();
            return Ok(Collection::List(list));
        }

        let rows: Vec<&[Datum]> = items.iter().filter_map(Datum::as_sequence).collect();
        if rows.len() != items.len() {
            return Err(Error::IrregularShape(
                "collection mixes scalars and sequences".into(),
            ));
        }
        if rows.iter().any(|row| row.iter().any(|d| !d.is_scalar())) {
            return Err(Error::UnsupportedDimensionality(
                "collections with more than two dimensions are not supported".into(),
            ));
        }

        let columns = rows[0].len();
        if let Some(r) = rows.iter().position(|row| row.is_empty()) {
            return Err(Error::EmptyCollection(format!("matrix row {} has no elements", r + 1)));
        }
        if let Some(r) = rows.iter().position(|row| row.len() != columns) {
            return Err(Error::IrregularShape(format!(
                "matrix row {} has {} columns, expected {}",
                r + 1,
                rows[r].len(),
                columns
            )));
        }

        let matrix = rows
            .iter()
            .map(|row| row.iter().map(|d| d.as_scalar().cloned()).collect())
            .collect();
        Ok(Collection::Matrix(matrix))
    }

    /// Check that the collection can be stored and read back with the same
    /// extents. Missing elements are allowed anywhere the declared dimension
    /// can still be recovered from the stored rows.
    fn validate(&self) -> Result<()> {
        match self {
            Collection::List(items) => {
                if items.is_empty() {
                    return Err(Error::EmptyCollection("list has no elements".into()));
                }
                if items.last().is_some_and(Option::is_none) {
                    return Err(Error::IrregularShape(
                        "last list element is missing; its length could not be recovered".into(),
                    ));
                }
            }
            Collection::Matrix(rows) => {
                let columns = rows.first().map(Vec::len).unwrap_or(0);
                if rows.is_empty() || columns == 0 {
                    return Err(Error::EmptyCollection("matrix has no elements".into()));
                }
                if let Some(r) = rows.iter().position(|row| row.len() != columns) {
                    return Err(Error::IrregularShape(format!(
                        "matrix row {} has {} columns, expected {}",
                        r + 1,
                        rows[r].len(),
                        columns
                    )));
                }
                if rows.last().is_some_and(|row| row.iter().all(Option::is_none)) {
                    return Err(Error::IrregularShape(
                        "last matrix row is missing; the row count could not be recovered".into(),
                    ));
                }
                if rows.iter().all(|row| row[columns - 1].is_none()) {
                    return Err(Error::IrregularShape(
                        "last matrix column is missing; the column count could not be recovered"
                            .into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn cells(f: &mut fmt::Formatter<'_>, items: &[Option<ScalarValue>]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match item {
                    Some(value) => write!(f, "{}", value)?,
                    None => write!(f, "_")?,
                }
            }
            write!(f, "]")
        }

        match self {
            Collection::List(items) => cells(f, items),
            Collection::Matrix(rows) => {
                writeln!(f, "[")?;
                for row in rows {
                    write!(f, "  ")?;
                    cells(f, row)?;
                    writeln!(f)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Flattens collections into result rows and rebuilds them.
pub struct CollectionSerializer<'a> {
    results: ResultStore<'a>,
}

impl<'a> CollectionSerializer<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { results: ResultStore::new(conn) }
    }

    /// Store `data` as results of `kind` for `step`.
    ///
    /// A scalar becomes a single plain row; sequences are classified with
    /// [`Collection::from_datum`] and flattened.
    pub fn insert_collection(
        &self,
        kind: &str,
        step: StepId,
        data: &Datum,
    ) -> Result<Vec<ResultId>> {
        match data {
            Datum::Scalar(value) => Ok(vec![self.results.insert(step, kind, value)?]),
            Datum::Sequence(_) => self.insert_shaped(kind, step, &Collection::from_datum(data)?),
        }
    }

    /// Store an already shaped collection. Missing elements produce no row.
    pub fn insert_shaped(
        &self,
        kind: &str,
        step: StepId,
        data: &Collection,
    ) -> Result<Vec<ResultId>> {
        data.validate()?;

        let mut ids = Vec::with_capacity(data.present());
        match data {
            Collection::List(items) => {
                let total = items.len().to_string();
                for (i, item) in items.iter().enumerate() {
                    let Some(value) = item else { continue };
                    let id = self.results.insert(step, kind, value)?;
                    let index = (i + 1).to_string();
                    self.results.properties(id).set_all([
                        (KEY_KIND, Shape::List.as_str()),
                        (KEY_INDEXING, ONE_BASED),
                        (KEY_INDEX, index.as_str()),
                        (KEY_ORIGINAL_COLLECTION_TYPE, ORIGINAL_COLLECTION_TYPE),
                        (KEY_TOTAL_DIMENSION, total.as_str()),
                    ])?;
                    ids.push(id);
                }
            }
            Collection::Matrix(rows) => {
                let total = format!("{},{}", rows.len(), rows[0].len());
                for (r, cells) in rows.iter().enumerate() {
                    for (c, cell) in cells.iter().enumerate() {
                        let Some(value) = cell else { continue };
                        let id = self.results.insert(step, kind, value)?;
                        let (row, column) = ((r + 1).to_string(), (c + 1).to_string());
                        self.results.properties(id).set_all([
                            (KEY_KIND, Shape::Matrix.as_str()),
                            (KEY_INDEXING, ONE_BASED),
                            (KEY_ROW, row.as_str()),
                            (KEY_COLUMN, column.as_str()),
                            (KEY_ORIGINAL_COLLECTION_TYPE, ORIGINAL_COLLECTION_TYPE),
                            (KEY_TOTAL_DIMENSION, total.as_str()),
                        ])?;
                        ids.push(id);
                    }
                }
            }
        }

        tracing::debug!(
            "Stored {} '{}' as {} rows for step {}",
            data.shape(),
            kind,
            ids.len(),
            step
        );
        Ok(ids)
    }

    /// Rebuild the collection stored as results of `kind` for `step`
    pub fn get_collection(&self, kind: &str, step: StepId) -> Result<Collection> {
        let rows = self.results.find(step, kind)?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!("no '{}' results for step {}", kind, step)));
        }

        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let props = self.results.properties(row.id).all()?;
            cells.push(StructuralRow { row, props });
        }

        let shape: Shape = cells[0].get(KEY_KIND)?.parse()?;
        let declared = cells[0].get(KEY_TOTAL_DIMENSION)?.to_string();
        for cell in &cells {
            if cell.get(KEY_KIND)? != shape.as_str() {
                return Err(inconsistent(format!(
                    "'{}' for step {} mixes List and Matrix rows (result {})",
                    kind, step, cell.row.id
                )));
            }
            if cell.get(KEY_INDEXING)? != ONE_BASED {
                return Err(inconsistent(format!(
                    "result {} uses unsupported indexing '{}'",
                    cell.row.id,
                    cell.get(KEY_INDEXING)?
                )));
            }
            if cell.get(KEY_TOTAL_DIMENSION)? != declared {
                return Err(inconsistent(format!(
                    "result {} declares dimension '{}', expected '{}'",
                    cell.row.id,
                    cell.get(KEY_TOTAL_DIMENSION)?,
                    declared
                )));
            }
        }

        match shape {
            Shape::List => rebuild_list(kind, &cells, &declared),
            Shape::Matrix => rebuild_matrix(kind, &cells, &declared),
        }
    }
}

/// A result row together with its properties
struct StructuralRow {
    row: ResultRow,
    props: BTreeMap<String, String>,
}

impl StructuralRow {
    fn get(&self, key: &str) -> Result<&str> {
        self.props.get(key).map(String::as_str).ok_or_else(|| {
            inconsistent(format!("result {} has no '{}' property", self.row.id, key))
        })
    }

    /// Parse a 1-based position into a 0-based index
    fn position(&self, key: &str) -> Result<usize> {
        let raw = self.get(key)?;
        match raw.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(inconsistent(format!(
                "result {} has invalid {} '{}'",
                self.row.id, key, raw
            ))),
        }
    }
}

fn inconsistent(message: String) -> Error {
    tracing::warn!("Inconsistent collection rows: {}", message);
    Error::InconsistentShape(message)
}

/// An empty vector with room for `len` items, refusing sizes that cannot be
/// allocated
fn reserve<T>(kind: &str, len: usize) -> Result<Vec<T>> {
    let mut items = Vec::new();
    items.try_reserve_exact(len).map_err(|_| {
        inconsistent(format!("'{}' declares {} elements, too many to rebuild", kind, len))
    })?;
    Ok(items)
}

fn empty_slots(kind: &str, len: usize) -> Result<Vec<Option<ScalarValue>>> {
    let mut slots = reserve(kind, len)?;
    slots.resize(len, None);
    Ok(slots)
}

fn list_dimension(kind: &str, declared: &str) -> Result<usize> {
    declared
        .parse()
        .map_err(|_| inconsistent(format!("'{}' has invalid list dimension '{}'", kind, declared)))
}

fn matrix_dimension(kind: &str, declared: &str) -> Result<(usize, usize)> {
    declared
        .split_once(',')
        .and_then(|(n, m)| Some((n.trim().parse().ok()?, m.trim().parse().ok()?)))
        .ok_or_else(|| {
            inconsistent(format!("'{}' has invalid matrix dimension '{}'", kind, declared))
        })
}

/// Reject a 0-based `index` that falls outside a declared extent of `limit`
fn within(cell: &StructuralRow, key: &str, index: usize, limit: usize) -> Result<usize> {
    if index >= limit {
        return Err(inconsistent(format!(
            "result {} has {} {} beyond the declared {}",
            cell.row.id,
            key,
            index + 1,
            limit
        )));
    }
    Ok(index)
}

fn duplicate(cell: &StructuralRow, position: String) -> Error {
    inconsistent(format!("result {} duplicates position {}", cell.row.id, position))
}

fn rebuild_list(kind: &str, cells: &[StructuralRow], declared: &str) -> Result<Collection> {
    let total = list_dimension(kind, declared)?;

    let mut placed = BTreeMap::new();
    for cell in cells {
        let index = within(cell, KEY_INDEX, cell.position(KEY_INDEX)?, total)?;
        if placed.insert(index, &cell.row.value).is_some() {
            return Err(duplicate(cell, (index + 1).to_string()));
        }
    }

    let extent = placed.keys().next_back().map_or(0, |last| last + 1);
    if extent != total {
        return Err(inconsistent(format!(
            "'{}' declares {} elements but rows extend to {}",
            kind, total, extent
        )));
    }

    let mut items = empty_slots(kind, total)?;
    for (index, value) in placed {
        items[index] = Some(value.clone());
    }
    Ok(Collection::List(items))
}

fn rebuild_matrix(kind: &str, cells: &[StructuralRow], declared: &str) -> Result<Collection> {
    let (total_rows, total_columns) = matrix_dimension(kind, declared)?;

    let mut placed = BTreeMap::new();
    for cell in cells {
        let row = within(cell, KEY_ROW, cell.position(KEY_ROW)?, total_rows)?;
        let column = within(cell, KEY_COLUMN, cell.position(KEY_COLUMN)?, total_columns)?;
        if placed.insert((row, column), &cell.row.value).is_some() {
            return Err(duplicate(cell, format!("{},{}", row + 1, column + 1)));
        }
    }

    let height = placed.keys().map(|(r, _)| r + 1).max().unwrap_or(0);
    let widest = placed.keys().map(|(_, c)| c + 1).max().unwrap_or(0);
    if total_rows != height || total_columns != widest {
        return Err(inconsistent(format!(
            "'{}' declares {}x{} but rows extend to {}x{}",
            kind, total_rows, total_columns, height, widest
        )));
    }

    // Each row is as long as its highest stored column
    let mut row_lengths = BTreeMap::new();
    for (row, column) in placed.keys() {
        row_lengths.insert(*row, column + 1);
    }
    let mut rows = reserve(kind, height)?;
    for row in 0..height {
        rows.push(empty_slots(kind, row_lengths.get(&row).copied().unwrap_or(0))?);
    }
    for ((row, column), value) in placed {
        rows[row][column] = Some(value.clone());
    }
    Ok(Collection::Matrix(rows))
}
