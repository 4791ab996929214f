//! A committed, immutable snapshot of sequencing decisions made so far.
//!
//! `add`/`remove` never mutate `self` — they return a new `PartialSolution`
//! that shares no mutable state with its parent, which is what lets both the
//! forward heuristic and the decision-diagram search keep many candidate
//! solutions alive (and cheaply comparable) at once.

use super::graph::{Edge, VertexId};
use super::ids::MachineId;
use super::instance::Instance;
use super::option::{IdGenerator, SchedulingOption};
use crate::application::services::longest_path::PathTimes;
use crate::domain::entities::graph::Graph;
use crate::error::{Result, SchedulerError};
use std::collections::HashMap;

pub type MachineEdges = HashMap<MachineId, Vec<Edge>>;

#[derive(Debug, Clone)]
pub struct PartialSolution {
    chosen_edges: MachineEdges,
    last_inserted_edge: HashMap<MachineId, usize>,
    first_feasible_edge: HashMap<MachineId, usize>,
    first_maint_edge: HashMap<MachineId, usize>,
    asapst: PathTimes,

    ranking: f64,
    avg_productivity: i64,
    makespan_last_scheduled_job: i64,
    earliest_start_future_operation: i64,
    nr_ops_in_loop: u32,
    maint_count: u32,

    id: u64,
    prev_id: Option<u64>,
}

impl PartialSolution {
    pub fn new(chosen_edges: MachineEdges, asapst: PathTimes, id_gen: &mut IdGenerator) -> Self {
        PartialSolution {
            chosen_edges,
            last_inserted_edge: HashMap::new(),
            first_feasible_edge: HashMap::new(),
            first_maint_edge: HashMap::new(),
            asapst,
            ranking: -1.0,
            avg_productivity: -1,
            makespan_last_scheduled_job: -1,
            earliest_start_future_operation: -1,
            nr_ops_in_loop: 0,
            maint_count: 0,
            id: id_gen.next_id(),
            prev_id: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prev_id(&self) -> Option<u64> {
        self.prev_id
    }

    pub fn chosen_edges(&self, machine: MachineId) -> &[Edge] {
        self.chosen_edges
            .get(&machine)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn chosen_edges_per_machine(&self) -> &MachineEdges {
        &self.chosen_edges
    }

    pub fn all_chosen_edges(&self) -> Vec<Edge> {
        self.chosen_edges.values().flatten().cloned().collect()
    }

    pub fn first_feasible_edge(&self, machine: MachineId) -> usize {
        self.first_feasible_edge.get(&machine).copied().unwrap_or(0)
    }

    pub fn first_maint_edge(&self, machine: MachineId) -> usize {
        self.first_maint_edge.get(&machine).copied().unwrap_or(0)
    }

    pub fn last_inserted_edge(&self, machine: MachineId) -> usize {
        self.last_inserted_edge.get(&machine).copied().unwrap_or(0)
    }

    pub fn asapst(&self) -> &PathTimes {
        &self.asapst
    }

    pub fn set_asapst(&mut self, asapst: PathTimes) {
        self.asapst = asapst;
    }

    /// The ASAP time of the last vertex in the graph (position-wise, not
    /// semantically "last job"). `-1` if the cached ASAPST is empty.
    pub fn makespan(&self) -> i64 {
        self.asapst.last().copied().unwrap_or(-1)
    }

    /// The completion time of the job scheduled last in the declared output
    /// order, per the instance's flow vector and processing times.
    pub fn real_makespan(&self, instance: &Instance, graph: &Graph) -> Result<i64> {
        let last_job = *instance
            .jobs_output_order()
            .last()
            .ok_or_else(|| SchedulerError::InconsistentInput("instance has no jobs".into()))?;
        let last_op = *instance
            .job_operations(last_job)?
            .last()
            .ok_or_else(|| SchedulerError::InconsistentInput("job has no operations".into()))?;
        let vid = graph.vertex_id_of(last_op)?;
        Ok(self.asapst[vid.value() as usize] + instance.processing_time(last_op))
    }

    pub fn ranking(&self) -> f64 {
        self.ranking
    }

    pub fn set_ranking(&mut self, value: f64) {
        self.ranking = value;
    }

    pub fn average_productivity(&self) -> i64 {
        self.avg_productivity
    }

    pub fn set_average_productivity(&mut self, value: i64) {
        self.avg_productivity = value;
    }

    pub fn makespan_last_scheduled_job(&self) -> i64 {
        self.makespan_last_scheduled_job
    }

    pub fn set_makespan_last_scheduled_job(&mut self, value: i64) {
        self.makespan_last_scheduled_job = value;
    }

    pub fn earliest_start_future_operation(&self) -> i64 {
        self.earliest_start_future_operation
    }

    pub fn set_earliest_start_future_operation(&mut self, value: i64) {
        self.earliest_start_future_operation = value;
    }

    pub fn nr_ops_in_loop(&self) -> u32 {
        self.nr_ops_in_loop
    }

    pub fn set_nr_ops_in_loop(&mut self, value: u32) {
        self.nr_ops_in_loop = value;
    }

    pub fn maint_count(&self) -> u32 {
        self.maint_count
    }

    pub fn incr_maint_count(&mut self) {
        self.maint_count += 1;
    }

    /// Inserts `option.cur_v` between `option.prev_v` and `option.next_v` on
    /// `machine`'s sequence, producing a new `PartialSolution`.
    ///
    /// A maintenance insertion does not advance `first_feasible_edge` — a
    /// maintenance action does not represent a scheduling decision that
    /// fixes prior choices in place the way a real operation does.
    pub fn add(
        &self,
        machine: MachineId,
        option: &SchedulingOption,
        asapst: PathTimes,
        id_gen: &mut IdGenerator,
    ) -> Self {
        let mut chosen_edges = self.chosen_edges.clone();
        let machine_edges = chosen_edges.entry(machine).or_default();
        machine_edges.insert(option.position, option.prev_edge.clone());
        machine_edges[option.position + 1] = option.next_edge.clone();

        let mut last_inserted_edge = self.last_inserted_edge.clone();
        last_inserted_edge.insert(machine, option.position + 1);

        let first_maint_edge = self.first_maint_edge.clone();

        let mut first_feasible_edge = self.first_feasible_edge.clone();
        let new_first_feasible = if option.is_maint {
            self.first_feasible_edge(machine)
        } else {
            option.position + 1
        };
        first_feasible_edge.insert(machine, new_first_feasible);

        let mut next = PartialSolution {
            chosen_edges,
            last_inserted_edge,
            first_feasible_edge,
            first_maint_edge,
            asapst,
            ranking: -1.0,
            avg_productivity: -1,
            makespan_last_scheduled_job: -1,
            earliest_start_future_operation: -1,
            nr_ops_in_loop: self.nr_ops_in_loop,
            maint_count: self.maint_count,
            id: id_gen.next_id(),
            prev_id: Some(self.id),
        };
        if option.is_maint {
            next.maint_count += 1;
        }
        next
    }

    /// Removes the edge at `option.position` from `machine`'s sequence,
    /// splicing `option.prev_edge` back in. `after` indicates whether the
    /// removal happens after `last_inserted_edge` (the common case during
    /// repair) — only when it does not does `last_inserted_edge` itself need
    /// to move back by one.
    pub fn remove(
        &self,
        machine: MachineId,
        option: &SchedulingOption,
        asapst: PathTimes,
        after: bool,
        id_gen: &mut IdGenerator,
    ) -> Self {
        let mut chosen_edges = self.chosen_edges.clone();
        let machine_edges = chosen_edges.entry(machine).or_default();
        machine_edges.remove(option.position);
        if option.position > 0 {
            machine_edges[option.position - 1] = option.prev_edge.clone();
        }

        let mut last_inserted_edge = self.last_inserted_edge.clone();
        if !after {
            let cur = last_inserted_edge.entry(machine).or_insert(0);
            *cur = cur.saturating_sub(1);
        }

        let first_maint_edge = self.first_maint_edge.clone();

        let mut first_feasible_edge = self.first_feasible_edge.clone();
        let cur = first_feasible_edge.entry(machine).or_insert(0);
        *cur = cur.saturating_sub(1);

        PartialSolution {
            chosen_edges,
            last_inserted_edge,
            first_feasible_edge,
            first_maint_edge,
            asapst,
            ranking: -1.0,
            avg_productivity: -1,
            makespan_last_scheduled_job: -1,
            earliest_start_future_operation: -1,
            nr_ops_in_loop: self.nr_ops_in_loop,
            maint_count: self.maint_count,
            id: id_gen.next_id(),
            prev_id: Some(self.id),
        }
    }
}

/// Pareto dominance between two partial solutions: `true` iff `lhs`
/// dominates `rhs` (every objective at least as good, minimizing makespan
/// and earliest-future-start, maximizing ops-in-loop).
pub fn dominates(lhs: &PartialSolution, rhs: &PartialSolution) -> bool {
    lhs.makespan_last_scheduled_job <= rhs.makespan_last_scheduled_job
        && lhs.earliest_start_future_operation <= rhs.earliest_start_future_operation
        && lhs.nr_ops_in_loop >= rhs.nr_ops_in_loop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::graph::VertexId;

    fn edge(a: u32, b: u32, w: i64) -> Edge {
        Edge {
            src: VertexId::new(a),
            dst: VertexId::new(b),
            weight: w,
        }
    }

    #[test]
    fn add_splices_prev_and_next_edges() {
        let mut edges = MachineEdges::new();
        edges.insert(MachineId(0), vec![edge(0, 2, 10)]);
        let mut gen = IdGenerator::new();
        let ps = PartialSolution::new(edges, vec![0, 5, 15], &mut gen);

        let opt = SchedulingOption::new(
            edge(0, 1, 3),
            edge(1, 2, 7),
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            0,
            false,
        );
        let next = ps.add(MachineId(0), &opt, vec![0, 3, 10], &mut gen);
        let seq = next.chosen_edges(MachineId(0));
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0], edge(0, 1, 3));
        assert_eq!(seq[1], edge(1, 2, 7));
        assert_eq!(next.first_feasible_edge(MachineId(0)), 1);
        assert_eq!(next.prev_id(), Some(ps.id()));
    }

    #[test]
    fn maintenance_insertion_does_not_advance_first_feasible_by_position() {
        let mut edges = MachineEdges::new();
        edges.insert(MachineId(0), vec![edge(0, 2, 10)]);
        let mut gen = IdGenerator::new();
        let ps = PartialSolution::new(edges, vec![0, 5, 15], &mut gen);

        let opt = SchedulingOption::new(
            edge(0, 9, 3),
            edge(9, 2, 7),
            VertexId::new(0),
            VertexId::new(9),
            VertexId::new(2),
            0,
            true,
        );
        let next = ps.add(MachineId(0), &opt, vec![0, 3, 10], &mut gen);
        assert_eq!(next.first_feasible_edge(MachineId(0)), 0);
        assert_eq!(next.maint_count(), 1);
    }

    #[test]
    fn dominance_requires_all_three_objectives() {
        let mut gen = IdGenerator::new();
        let mut a = PartialSolution::new(MachineEdges::new(), vec![], &mut gen);
        let mut b = PartialSolution::new(MachineEdges::new(), vec![], &mut gen);
        a.set_makespan_last_scheduled_job(10);
        a.set_earliest_start_future_operation(5);
        a.set_nr_ops_in_loop(3);
        b.set_makespan_last_scheduled_job(20);
        b.set_earliest_start_future_operation(5);
        b.set_nr_ops_in_loop(3);
        assert!(dominates(&a, &b));
        assert!(!dominates(&b, &a));
    }
}
