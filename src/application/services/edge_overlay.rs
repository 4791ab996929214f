//! A scratch overlay over the constraint graph: edges added through an
//! `EdgeOverlay` are automatically removed when the guard drops, so a
//! feasibility check that bails out early via `?` can never leave the graph
//! in a half-mutated state.
//!
//! Replaces the teacher's manual add-then-remove edge pairing (see
//! `SPEC_FULL.md` §9, "graph mutation across feasibility checks") with an
//! RAII guard.

use crate::domain::entities::graph::{Edge, Graph};
use crate::error::Result;

pub struct EdgeOverlay<'g> {
    graph: &'g mut Graph,
    added: Vec<Edge>,
    committed: bool,
}

impl<'g> EdgeOverlay<'g> {
    pub fn new(graph: &'g mut Graph) -> Self {
        EdgeOverlay {
            graph,
            added: Vec::new(),
            committed: false,
        }
    }

    /// Adds `edges`, recording exactly the ones newly inserted so they can be
    /// rolled back.
    pub fn add_edges(&mut self, edges: &[Edge]) -> Result<()> {
        let added = self.graph.add_edges(edges)?;
        self.added.extend(added);
        Ok(())
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.graph
    }

    /// Keeps the overlay's edges in the underlying graph permanently.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for EdgeOverlay<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.added.is_empty() {
            let _ = self.graph.remove_edges(&self.added);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ids::{JobId, MachineId, OperationId};
    use crate::domain::entities::operation::Operation;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    #[test]
    fn dropped_overlay_rolls_back_its_edges() {
        let mut g = Graph::new();
        let src = g.add_source(MachineId(0));
        let a = g.add_operation(op(0, 0));
        {
            let mut overlay = EdgeOverlay::new(&mut g);
            overlay.add_edges(&[Edge { src, dst: a, weight: 5 }]).unwrap();
            assert!(overlay.graph().has_edge(src, a));
        }
        assert!(!g.has_edge(src, a), "edges must be rolled back once the overlay drops");
    }

    #[test]
    fn committed_overlay_keeps_its_edges() {
        let mut g = Graph::new();
        let src = g.add_source(MachineId(0));
        let a = g.add_operation(op(0, 0));
        let mut overlay = EdgeOverlay::new(&mut g);
        overlay.add_edges(&[Edge { src, dst: a, weight: 5 }]).unwrap();
        overlay.commit();
        assert!(g.has_edge(src, a));
    }

    #[test]
    fn overlay_never_rolls_back_edges_that_already_existed() {
        let mut g = Graph::new();
        let src = g.add_source(MachineId(0));
        let a = g.add_operation(op(0, 0));
        g.add_edge(src, a, 1).unwrap();
        {
            let mut overlay = EdgeOverlay::new(&mut g);
            overlay.add_edges(&[Edge { src, dst: a, weight: 99 }]).unwrap();
        }
        assert!(g.has_edge(src, a));
        assert_eq!(g.get_weight(src, a).unwrap(), 1);
    }
}
