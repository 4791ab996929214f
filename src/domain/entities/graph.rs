//! The constraint graph: a directed, non-multi graph representing a
//! difference-constraint system. An edge `u -w-> v` means `t(v) >= t(u) + w`.
//!
//! This is the tagged-enum redesign of the §9 "sentinel-tagged sub-types"
//! note: rather than reserving three `JobId` values at the top of the range
//! for source/terminus/maintenance vertices, each vertex carries an explicit
//! `VertexKind`. Vertex removal is never supported — only edges come and go.

use super::ids::{JobId, MachineId};
pub use super::ids::VertexId;
use super::operation::{MaintType, Operation};
use crate::error::{Result, SchedulerError};
use std::collections::HashMap;

/// What a vertex represents. Only `Real` vertices participate in job-indexed
/// lookups; the others are structural anchors the builder inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Real(Operation),
    Source(MachineId),
    Terminus,
    Maintenance(MaintType),
}

impl VertexKind {
    pub fn as_operation(&self) -> Option<Operation> {
        match self {
            VertexKind::Real(op) => Some(*op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub src: VertexId,
    pub dst: VertexId,
    pub weight: i64,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    pub kind: VertexKind,
    outgoing: HashMap<VertexId, i64>,
    incoming: HashMap<VertexId, i64>,
}

impl Vertex {
    fn new(id: VertexId, kind: VertexKind) -> Self {
        Vertex {
            id,
            kind,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    pub fn outgoing_edges(&self) -> &HashMap<VertexId, i64> {
        &self.outgoing
    }

    pub fn incoming_edges(&self) -> &HashMap<VertexId, i64> {
        &self.incoming
    }

    pub fn has_outgoing_edge(&self, dst: VertexId) -> bool {
        self.outgoing.contains_key(&dst)
    }

    pub fn operation(&self) -> Option<Operation> {
        self.kind.as_operation()
    }
}

/// An adjacency-list constraint graph. Vertices are append-only; edges may
/// be added, updated, or removed freely. At most one directed edge exists
/// between any ordered pair of vertices.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
    operation_index: HashMap<Operation, VertexId>,
    job_index: HashMap<JobId, Vec<VertexId>>,
    source_index: HashMap<MachineId, VertexId>,
    terminus: Option<VertexId>,
    maintenance_vertices: Vec<VertexId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_vertex(&mut self, kind: VertexKind) -> VertexId {
        let id = VertexId::new(self.vertices.len() as u32);
        self.vertices.push(Vertex::new(id, kind));
        id
    }

    /// Registers a real operation vertex. Re-registering an operation that
    /// already has a vertex creates a *new* vertex and repoints the
    /// operation index at it (mirroring the teacher's `add_vertex`, which
    /// never de-duplicates); callers that require uniqueness must check
    /// `has_vertex` first.
    pub fn add_operation(&mut self, op: Operation) -> VertexId {
        let id = self.push_vertex(VertexKind::Real(op));
        self.operation_index.insert(op, id);
        self.job_index.entry(op.job_id).or_default().push(id);
        id
    }

    pub fn add_source(&mut self, machine: MachineId) -> VertexId {
        let id = self.push_vertex(VertexKind::Source(machine));
        self.source_index.insert(machine, id);
        id
    }

    pub fn add_terminus(&mut self) -> VertexId {
        let id = self.push_vertex(VertexKind::Terminus);
        self.terminus = Some(id);
        id
    }

    pub fn add_maintenance(&mut self, maint_class: MaintType) -> VertexId {
        let id = self.push_vertex(VertexKind::Maintenance(maint_class));
        self.maintenance_vertices.push(id);
        id
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex> {
        self.vertices
            .get(id.value() as usize)
            .ok_or(SchedulerError::VertexOutOfRange(id, self.vertices.len()))
    }

    fn vertex_mut(&mut self, id: VertexId) -> Result<&mut Vertex> {
        let len = self.vertices.len();
        self.vertices
            .get_mut(id.value() as usize)
            .ok_or(SchedulerError::VertexOutOfRange(id, len))
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex_id_of(&self, op: Operation) -> Result<VertexId> {
        self.operation_index
            .get(&op)
            .copied()
            .ok_or(SchedulerError::UnknownOperation(op))
    }

    pub fn has_vertex(&self, op: Operation) -> bool {
        self.operation_index.contains_key(&op)
    }

    pub fn source_of(&self, machine: MachineId) -> Result<VertexId> {
        self.source_index
            .get(&machine)
            .copied()
            .ok_or(SchedulerError::UnknownMachine(machine))
    }

    pub fn terminus(&self) -> Option<VertexId> {
        self.terminus
    }

    pub fn maintenance_vertices(&self) -> &[VertexId] {
        &self.maintenance_vertices
    }

    pub fn vertices_of_job(&self, job: JobId) -> Result<&[VertexId]> {
        self.job_index
            .get(&job)
            .map(|v| v.as_slice())
            .ok_or(SchedulerError::UnknownJob(job))
    }

    /// All vertices for the inclusive job range `[start, end]`, in job-id
    /// then within-job insertion order.
    pub fn vertices_of_job_range(&self, start: JobId, end: JobId) -> Vec<VertexId> {
        let mut out = Vec::new();
        for jid in start.value()..=end.value() {
            if let Some(v) = self.job_index.get(&JobId::new(jid)) {
                out.extend(v.iter().copied());
            }
        }
        out
    }

    pub fn is_source(&self, id: VertexId) -> Result<bool> {
        Ok(matches!(self.vertex(id)?.kind, VertexKind::Source(_)))
    }

    pub fn is_terminus(&self, id: VertexId) -> Result<bool> {
        Ok(matches!(self.vertex(id)?.kind, VertexKind::Terminus))
    }

    pub fn is_maint(&self, id: VertexId) -> Result<bool> {
        Ok(matches!(self.vertex(id)?.kind, VertexKind::Maintenance(_)))
    }

    pub fn is_visible(&self, id: VertexId) -> Result<bool> {
        Ok(matches!(self.vertex(id)?.kind, VertexKind::Real(_)))
    }

    pub fn has_edge(&self, src: VertexId, dst: VertexId) -> bool {
        self.vertices
            .get(src.value() as usize)
            .map(|v| v.has_outgoing_edge(dst))
            .unwrap_or(false)
    }

    pub fn get_weight(&self, src: VertexId, dst: VertexId) -> Result<i64> {
        self.vertex(src)?
            .outgoing
            .get(&dst)
            .copied()
            .ok_or(SchedulerError::NoSuchEdge(src, dst))
    }

    pub fn get_edge(&self, src: VertexId, dst: VertexId) -> Result<Edge> {
        Ok(Edge {
            src,
            dst,
            weight: self.get_weight(src, dst)?,
        })
    }

    /// Adds an edge, overwriting any existing weight between the same pair.
    pub fn add_or_update_edge(&mut self, src: VertexId, dst: VertexId, weight: i64) -> Result<()> {
        {
            let v = self.vertex_mut(src)?;
            v.outgoing.insert(dst, weight);
        }
        let v = self.vertex_mut(dst)?;
        v.incoming.insert(src, weight);
        Ok(())
    }

    /// Adds an edge only if one does not already exist; a no-op (weight not
    /// overwritten) when it does. Mirrors the teacher's plain `add_edge`.
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId, weight: i64) -> Result<()> {
        if self.has_edge(src, dst) {
            return Ok(());
        }
        self.add_or_update_edge(src, dst, weight)
    }

    /// Adds every edge in `edges` that does not already exist, and returns
    /// only the ones actually added — the caller can undo exactly those.
    pub fn add_edges(&mut self, edges: &[Edge]) -> Result<Vec<Edge>> {
        let mut added = Vec::with_capacity(edges.len());
        for e in edges {
            if !self.has_edge(e.src, e.dst) {
                self.add_or_update_edge(e.src, e.dst, e.weight)?;
                added.push(e.clone());
            }
        }
        Ok(added)
    }

    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId) -> Result<()> {
        {
            let v = self.vertex_mut(src)?;
            v.outgoing.remove(&dst);
        }
        let v = self.vertex_mut(dst)?;
        v.incoming.remove(&src);
        Ok(())
    }

    pub fn remove_edges(&mut self, edges: &[Edge]) -> Result<()> {
        for e in edges {
            self.remove_edge(e.src, e.dst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ids::OperationId;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    #[test]
    fn add_edges_reports_only_new_edges() {
        let mut g = Graph::new();
        let a = g.add_operation(op(0, 0));
        let b = g.add_operation(op(0, 1));
        g.add_or_update_edge(a, b, 5).unwrap();

        let added = g
            .add_edges(&[
                Edge { src: a, dst: b, weight: 99 },
                Edge { src: b, dst: a, weight: 1 },
            ])
            .unwrap();

        assert_eq!(added.len(), 1);
        assert_eq!(g.get_weight(a, b).unwrap(), 5, "existing edge weight must not be overwritten");
        assert_eq!(g.get_weight(b, a).unwrap(), 1);
    }

    #[test]
    fn add_or_update_overwrites_weight() {
        let mut g = Graph::new();
        let a = g.add_operation(op(0, 0));
        let b = g.add_operation(op(0, 1));
        g.add_or_update_edge(a, b, 5).unwrap();
        g.add_or_update_edge(a, b, 7).unwrap();
        assert_eq!(g.get_weight(a, b).unwrap(), 7);
    }

    #[test]
    fn remove_edge_clears_both_directions() {
        let mut g = Graph::new();
        let a = g.add_operation(op(0, 0));
        let b = g.add_operation(op(0, 1));
        g.add_or_update_edge(a, b, 5).unwrap();
        g.remove_edge(a, b).unwrap();
        assert!(!g.has_edge(a, b));
        assert!(!g.vertex(b).unwrap().incoming_edges().contains_key(&a));
    }

    #[test]
    fn vertex_kinds_are_tagged_explicitly() {
        let mut g = Graph::new();
        let real = g.add_operation(op(1, 0));
        let src = g.add_source(MachineId(0));
        let term = g.add_terminus();
        let maint = g.add_maintenance(3);

        assert!(g.is_visible(real).unwrap());
        assert!(g.is_source(src).unwrap());
        assert!(g.is_terminus(term).unwrap());
        assert!(g.is_maint(maint).unwrap());
        assert!(!g.is_visible(src).unwrap());
    }

    #[test]
    fn job_index_groups_only_real_vertices() {
        let mut g = Graph::new();
        g.add_source(MachineId(0));
        let a = g.add_operation(op(2, 0));
        let b = g.add_operation(op(2, 1));
        assert_eq!(g.vertices_of_job(JobId(2)).unwrap(), &[a, b]);
    }
}
