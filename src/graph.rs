//! Step Graph - dependencies between processing steps
//!
//! Edges live in `processing_step_hierarchy` as (preceding, dependent)
//! pairs. Both adjacency views are queries over that one table.
//! Acyclicity is checked before every insert.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use rusqlite::{Connection, params};
use crate::{Error, Result};
use crate::reference::ProjectId;
use crate::step::{ProcessingStep, StepId, StepStore};

/// Direction of a traversal over the hierarchy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Towards steps that depend on the current one
    Dependents,
    /// Towards steps the current one depends on
    Preceding,
}

/// Access to the step dependency DAG
pub struct StepGraph<'a> {
    conn: &'a Connection,
}

impl<'a> StepGraph<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record that `dependent` consumes the output of `preceding`.
    ///
    /// Fails with [`Error::Cycle`] if `preceding` is already reachable from
    /// `dependent`; the graph is left unchanged in that case. Adding an
    /// existing edge again is a no-op.
    pub fn add_dependency(&self, preceding: StepId, dependent: StepId) -> Result<()> {
        if preceding == dependent {
            return Err(Error::SelfDependency(preceding.0));
        }

        let steps = StepStore::new(self.conn);
        for id in [preceding, dependent] {
            if !steps.exists(id)? {
                return Err(Error::NotFound(format!("processing step {}", id)));
            }
        }

        if self.reaches(dependent, preceding, Direction::Dependents)? {
            tracing::warn!(
                "Rejected dependency {} -> {}: would close a cycle",
                preceding,
                dependent
            );
            return Err(Error::Cycle { preceding: preceding.0, dependent: dependent.0 });
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO processing_step_hierarchy (preceding_id, dependent_id) VALUES (?1, ?2)",
            params![preceding.0, dependent.0],
        )?;
        tracing::debug!("Added dependency {} -> {}", preceding, dependent);
        Ok(())
    }

    /// Remove an edge. Absent edges are ignored.
    pub fn remove_dependency(&self, preceding: StepId, dependent: StepId) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM processing_step_hierarchy WHERE preceding_id = ?1 AND dependent_id = ?2",
            params![preceding.0, dependent.0],
        )?;
        if removed > 0 {
            tracing::debug!("Removed dependency {} -> {}", preceding, dependent);
        }
        Ok(())
    }

    /// Steps that `step` directly depends on
    pub fn preceding_steps(&self, step: StepId) -> Result<BTreeSet<StepId>> {
        self.neighbours(step, Direction::Preceding)
    }

    /// Steps that directly depend on `step`
    pub fn dependent_steps(&self, step: StepId) -> Result<BTreeSet<StepId>> {
        self.neighbours(step, Direction::Dependents)
    }

    /// Every step `step` transitively depends on
    pub fn ancestors(&self, step: StepId) -> Result<BTreeSet<StepId>> {
        self.closure(step, Direction::Preceding)
    }

    /// Every step that transitively depends on `step`
    pub fn descendants(&self, step: StepId) -> Result<BTreeSet<StepId>> {
        self.closure(step, Direction::Dependents)
    }

    /// Delete a step together with everything it owns.
    ///
    /// Results, their properties, step properties, keyword links and every
    /// edge touching the step go with it through the foreign keys.
    pub fn remove_step(&self, step: StepId) -> Result<()> {
        let removed = self.conn.execute("DELETE FROM processing_steps WHERE id = ?1", [step.0])?;
        if removed == 0 {
            return Err(Error::NotFound(format!("processing step {}", step)));
        }
        tracing::info!("Removed step {} and its results", step);
        Ok(())
    }

    /// Load the steps of a project and the edges between them
    pub fn load(&self, project: ProjectId) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for step in StepStore::new(self.conn).list_for_project(project)? {
            graph.add_step(step);
        }

        let mut stmt = self.conn.prepare(
            "SELECT h.preceding_id, h.dependent_id FROM processing_step_hierarchy h
             JOIN processing_steps p ON p.id = h.preceding_id
             JOIN processing_steps d ON d.id = h.dependent_id
             WHERE p.project_id = ?1 AND d.project_id = ?1",
        )?;
        let edges = stmt
            .query_map([project.0], |row| Ok((StepId(row.get(0)?), StepId(row.get(1)?))))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (preceding, dependent) in edges {
            graph.add_edge(preceding, dependent);
        }

        Ok(graph)
    }

    // ========== Traversal ==========

    fn neighbours(&self, step: StepId, direction: Direction) -> Result<BTreeSet<StepId>> {
        let sql = match direction {
            Direction::Dependents => {
                "SELECT dependent_id FROM processing_step_hierarchy WHERE preceding_id = ?1"
            }
            Direction::Preceding => {
                "SELECT preceding_id FROM processing_step_hierarchy WHERE dependent_id = ?1"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([step.0], |row| Ok(StepId(row.get(0)?)))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    /// Breadth-first closure, excluding `start` itself
    fn closure(&self, start: StepId, direction: Direction) -> Result<BTreeSet<StepId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut found = BTreeSet::new();

        queue.push_back(start);
        visited.insert(start);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbours(current, direction)? {
                if visited.insert(next) {
                    found.insert(next);
                    queue.push_back(next);
                }
            }
        }

        Ok(found)
    }

    fn reaches(&self, from: StepId, target: StepId, direction: Direction) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return Ok(true);
            }
            for next in self.neighbours(current, direction)? {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        Ok(false)
    }
}

/// In-memory snapshot of a project's step DAG.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    steps: BTreeMap<StepId, ProcessingStep>,
    /// preceding -> dependents
    edges_from: HashMap<StepId, BTreeSet<StepId>>,
    /// dependent -> preceding
    edges_to: HashMap<StepId, BTreeSet<StepId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: ProcessingStep) {
        self.steps.insert(step.id, step);
    }

    pub fn add_edge(&mut self, preceding: StepId, dependent: StepId) {
        self.edges_from.entry(preceding).or_default().insert(dependent);
        self.edges_to.entry(dependent).or_default().insert(preceding);
    }

    pub fn step(&self, id: StepId) -> Option<&ProcessingStep> {
        self.steps.get(&id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &ProcessingStep> {
        self.steps.values()
    }

    pub fn dependents(&self, id: StepId) -> impl Iterator<Item = StepId> + '_ {
        self.edges_from.get(&id).into_iter().flatten().copied()
    }

    pub fn preceding(&self, id: StepId) -> impl Iterator<Item = StepId> + '_ {
        self.edges_to.get(&id).into_iter().flatten().copied()
    }

    /// Steps ordered so each appears after everything it depends on.
    ///
    /// Steps that become ready at the same time come out by ascending id.
    pub fn topological_order(&self) -> Vec<&ProcessingStep> {
        let mut pending: HashMap<StepId, usize> = self
            .steps
            .keys()
            .map(|id| (*id, self.preceding(*id).filter(|p| self.steps.contains_key(p)).count()))
            .collect();

        let mut ready: BTreeSet<StepId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(id) = ready.pop_first() {
            if let Some(step) = self.steps.get(&id) {
                order.push(step);
            }
            for next in self.dependents(id) {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        order
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            steps: self.steps.len(),
            edges: self.edges_from.values().map(BTreeSet::len).sum(),
            roots: self.steps.keys().filter(|id| self.preceding(**id).next().is_none()).count(),
            leaves: self.steps.keys().filter(|id| self.dependents(**id).next().is_none()).count(),
        }
    }
}

/// Statistics about a dependency graph
#[derive(Debug, Clone)]
pub struct GraphStats {
    pub steps: usize,
    pub edges: usize,
    pub roots: usize,
    pub leaves: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Step Graph Statistics:")?;
        writeln!(f, "  Steps: {}", self.steps)?;
        writeln!(f, "  Dependencies: {}", self.edges)?;
        writeln!(f, "  Roots: {} Leaves: {}", self.roots, self.leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceStore;
    use crate::step::NewStep;
    use crate::storage::Database;

    fn setup(kinds: &[&str]) -> (Database, ProjectId, Vec<StepId>) {
        let db = Database::open_in_memory().unwrap();
        let project = ReferenceStore::new(db.connection()).get_or_create_project("Dummy").unwrap();
        let steps = StepStore::new(db.connection());
        let ids = kinds
            .iter()
            .map(|kind| steps.create(&NewStep::new(*kind, project.id)).unwrap().id)
            .collect();
        (db, project.id, ids)
    }

    #[test]
    fn test_dependency_is_visible_from_both_sides() {
        let (db, _, ids) = setup(&["RHF", "CCSD"]);
        let graph = StepGraph::new(db.connection());

        graph.add_dependency(ids[0], ids[1]).unwrap();
        assert!(graph.dependent_steps(ids[0]).unwrap().contains(&ids[1]));
        assert!(graph.preceding_steps(ids[1]).unwrap().contains(&ids[0]));

        graph.remove_dependency(ids[0], ids[1]).unwrap();
        assert!(graph.dependent_steps(ids[0]).unwrap().is_empty());
        assert!(graph.preceding_steps(ids[1]).unwrap().is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let (db, _, ids) = setup(&["A", "B"]);
        let graph = StepGraph::new(db.connection());
        graph.add_dependency(ids[0], ids[1]).unwrap();
        graph.add_dependency(ids[0], ids[1]).unwrap();
        assert_eq!(db.count_rows("processing_step_hierarchy").unwrap(), 1);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let (db, _, ids) = setup(&["A"]);
        let err = StepGraph::new(db.connection()).add_dependency(ids[0], ids[0]).unwrap_err();
        assert!(matches!(err, Error::SelfDependency(_)));
    }

    #[test]
    fn test_cycles_rejected() {
        let (db, _, ids) = setup(&["A", "B", "C"]);
        let graph = StepGraph::new(db.connection());

        graph.add_dependency(ids[0], ids[1]).unwrap();
        let err = graph.add_dependency(ids[1], ids[0]).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));

        graph.add_dependency(ids[1], ids[2]).unwrap();
        let err = graph.add_dependency(ids[2], ids[0]).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));

        // Unchanged after the rejections
        assert!(graph.preceding_steps(ids[0]).unwrap().is_empty());
        assert_eq!(db.count_rows("processing_step_hierarchy").unwrap(), 2);
    }

    #[test]
    fn test_unknown_step() {
        let (db, _, ids) = setup(&["A"]);
        let err = StepGraph::new(db.connection()).add_dependency(ids[0], StepId(99)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_transitive_closures() {
        let (db, _, ids) = setup(&["A", "B", "C", "D"]);
        let graph = StepGraph::new(db.connection());
        graph.add_dependency(ids[0], ids[1]).unwrap();
        graph.add_dependency(ids[1], ids[2]).unwrap();
        graph.add_dependency(ids[0], ids[3]).unwrap();

        let descendants = graph.descendants(ids[0]).unwrap();
        assert_eq!(descendants, [ids[1], ids[2], ids[3]].into_iter().collect());
        assert_eq!(graph.ancestors(ids[2]).unwrap(), [ids[0], ids[1]].into_iter().collect());
        assert!(graph.ancestors(ids[0]).unwrap().is_empty());
    }

    #[test]
    fn test_remove_step_prunes_edges() {
        let (db, _, ids) = setup(&["A", "B", "C"]);
        let graph = StepGraph::new(db.connection());
        graph.add_dependency(ids[0], ids[1]).unwrap();
        graph.add_dependency(ids[1], ids[2]).unwrap();

        graph.remove_step(ids[1]).unwrap();
        assert!(graph.dependent_steps(ids[0]).unwrap().is_empty());
        assert!(graph.preceding_steps(ids[2]).unwrap().is_empty());
        assert_eq!(db.count_rows("processing_step_hierarchy").unwrap(), 0);

        assert!(matches!(graph.remove_step(ids[1]), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_topological_order() {
        let (db, project, ids) = setup(&["A", "B", "C", "D"]);
        let graph = StepGraph::new(db.connection());
        graph.add_dependency(ids[3], ids[0]).unwrap();
        graph.add_dependency(ids[2], ids[1]).unwrap();
        graph.add_dependency(ids[0], ids[1]).unwrap();

        let dag = graph.load(project).unwrap();
        let order: Vec<StepId> = dag.topological_order().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![ids[2], ids[3], ids[0], ids[1]]);

        let stats = dag.stats();
        assert_eq!(stats.steps, 4);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.leaves, 1);
    }
}
