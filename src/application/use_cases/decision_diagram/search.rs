//! The decision-diagram search loop: expands [`DdVertex`] states one ready
//! job at a time, pruning by bound and by dominance, until the open queue is
//! exhausted or a budget runs out.
//!
//! Grounded on `solvers/dd.cpp`'s main loop and `DD/vertex.hpp`'s state
//! expansion. Two simplifications from the original, both noted in
//! `DESIGN.md`: the lower bound used for pruning is the state's own ASAP
//! makespan rather than a separately maintained inferred-edges bound, and
//! each state carries its own full edge lineage (cloning the base graph and
//! replaying `all_edges()`) instead of mutating one shared graph with
//! add/remove pairs, since states here branch and must stay independently
//! valid.

use super::solution::{DdSolution, TerminationReason};
use super::vertex::DdVertex;
use crate::application::services::edge_overlay::EdgeOverlay;
use crate::application::services::graph_builder::{build_fixed_sequence, build_search_base, dependent_weight};
use crate::application::services::longest_path::{compute_alap, compute_asap, compute_asap_windowed, initialize_alap, initialize_asap};
use crate::domain::entities::graph::{Edge, Graph, VertexId};
use crate::domain::entities::ids::{JobId, MachineId, StateId};
use crate::domain::entities::instance::Instance;
use crate::domain::entities::operation::Operation;
use crate::domain::entities::option::IdGenerator;
use crate::domain::entities::partial_solution::MachineEdges;
use crate::domain::value_objects::solver_config::{ExplorationType, SolverConfig};
use crate::error::{Result, SchedulerError};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Instant;

struct Ranked {
    score: i64,
    vertex: DdVertex,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // `BinaryHeap` is a max-heap; reversing the comparison makes the
    // smallest score (the most promising lower bound) pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.score.cmp(&self.score)
    }
}

/// Orders states for expansion. `Depth`/`Breadth` are a plain stack/queue;
/// `Best`/`Static`/`Adaptive` share a priority queue keyed by a score. This
/// implementation collapses `Best` and `Static` into the same discipline —
/// the original distinguishes them by whether priorities are recomputed on
/// every insertion, which has no externally observable effect once both are
/// backed by a real priority queue. `Adaptive` blends the lower bound with
/// search depth, weighted by `rank_factor`, favoring depth-first behavior as
/// `rank_factor` grows from 0 to 1 — a deterministic stand-in for the
/// original's randomized best/depth mix, since nothing in this crate may
/// call into a source of randomness.
enum Queue {
    Stack(Vec<DdVertex>),
    Fifo(VecDeque<DdVertex>),
    Ranked(BinaryHeap<Ranked>, f64),
}

impl Queue {
    fn new(exploration: ExplorationType, rank_factor: f64) -> Self {
        match exploration {
            ExplorationType::Depth => Queue::Stack(Vec::new()),
            ExplorationType::Breadth => Queue::Fifo(VecDeque::new()),
            ExplorationType::Best | ExplorationType::Static => Queue::Ranked(BinaryHeap::new(), 0.0),
            ExplorationType::Adaptive => Queue::Ranked(BinaryHeap::new(), rank_factor),
        }
    }

    fn push(&mut self, vertex: DdVertex) {
        match self {
            Queue::Stack(v) => v.push(vertex),
            Queue::Fifo(v) => v.push_back(vertex),
            Queue::Ranked(heap, rank_factor) => {
                let score = vertex.lower_bound() - (*rank_factor * vertex.vertex_depth() as f64) as i64;
                heap.push(Ranked { score, vertex });
            }
        }
    }

    fn pop(&mut self) -> Option<DdVertex> {
        match self {
            Queue::Stack(v) => v.pop(),
            Queue::Fifo(v) => v.pop_front(),
            Queue::Ranked(heap, _) => heap.pop().map(|r| r.vertex),
        }
    }

    fn min_open_bound(&self) -> Option<i64> {
        match self {
            Queue::Stack(v) => v.iter().map(|s| s.lower_bound()).min(),
            Queue::Fifo(v) => v.iter().map(|s| s.lower_bound()).min(),
            Queue::Ranked(heap, _) => heap.iter().map(|r| r.vertex.lower_bound()).min(),
        }
    }
}

fn protected_sources(instance: &Instance, graph: &Graph) -> Result<Vec<VertexId>> {
    instance.machines().iter().map(|&m| graph.source_of(m)).collect()
}

fn initial_vertex(instance: &Instance, graph: &Graph, id_gen: &mut IdGenerator) -> Result<DdVertex> {
    let mut asapst = initialize_asap(graph, &[], true)?;
    let cycle = compute_asap(graph, &mut asapst);
    if !cycle.is_empty() {
        return Err(SchedulerError::PositiveCycleDetected(
            cycle.into_iter().map(|e| (e.src, e.dst, e.weight)).collect(),
        ));
    }

    let protected = protected_sources(instance, graph)?;
    let mut alapst = initialize_alap(graph, true)?;
    let cycle = compute_alap(graph, &mut alapst, &protected)?;
    if !cycle.is_empty() {
        return Err(SchedulerError::PositiveCycleDetected(
            cycle.into_iter().map(|e| (e.src, e.dst, e.weight)).collect(),
        ));
    }

    let last_operation: HashMap<MachineId, VertexId> = instance
        .machines()
        .iter()
        .map(|&m| graph.source_of(m).map(|v| (m, v)))
        .collect::<Result<_>>()?;

    let jobs_completion = vec![0usize; instance.jobs_output_order().len()];

    let mut v = DdVertex::new(
        StateId::new(id_gen.next_id() as u32),
        MachineEdges::new(),
        asapst,
        alapst,
        jobs_completion,
        Vec::new(),
        last_operation,
        HashSet::new(),
        0,
    );
    v.set_ready_operations(instance, graph)?;
    Ok(v)
}

/// Walks a full job permutation into a terminal, fully-committed state, used
/// to seed the search with a known incumbent before any expansion happens.
fn seed_vertex(instance: &Instance, job_order: &[JobId], id_gen: &mut IdGenerator) -> Result<Option<DdVertex>> {
    let full = build_fixed_sequence(instance, job_order)?;
    let mut asapst = initialize_asap(&full, &[], true)?;
    let cycle = compute_asap(&full, &mut asapst);
    if !cycle.is_empty() {
        return Ok(None);
    }

    let protected = protected_sources(instance, &full)?;
    let mut alapst = initialize_alap(&full, true)?;
    let cycle = compute_alap(&full, &mut alapst, &protected)?;
    if !cycle.is_empty() {
        return Ok(None);
    }

    let mut machine_edges = MachineEdges::new();
    let mut last_operation: HashMap<MachineId, VertexId> = HashMap::new();
    let mut scheduled_ops: HashSet<VertexId> = HashSet::new();

    for &m in instance.machines() {
        let mut chain = Vec::new();
        let mut v = full.source_of(m)?;
        loop {
            let next = full
                .vertex(v)?
                .outgoing_edges()
                .keys()
                .copied()
                .find(|&d| matches!(full.vertex(d).ok().and_then(|vtx| vtx.operation()), Some(op) if instance.machine(op).map(|mm| mm == m).unwrap_or(false)));
            let Some(next) = next else { break };
            let weight = full.get_weight(v, next)?;
            chain.push(Edge { src: v, dst: next, weight });
            scheduled_ops.insert(next);
            v = next;
        }
        last_operation.insert(m, v);
        machine_edges.insert(m, chain);
    }

    let jobs_completion: Vec<usize> = instance
        .jobs_output_order()
        .iter()
        .map(|&j| instance.job_operations(j).map(|ops| ops.len()))
        .collect::<Result<_>>()?;

    let mut v = DdVertex::new(
        StateId::new(id_gen.next_id() as u32),
        machine_edges,
        asapst,
        alapst,
        jobs_completion,
        job_order.to_vec(),
        last_operation,
        scheduled_ops,
        job_order.len() as u64,
    );
    v.set_terminal(true);
    Ok(Some(v))
}

fn completion_at(state: &DdVertex, instance: &Instance, base: &Graph, machine: MachineId) -> Result<i64> {
    let v = *state
        .last_operation()
        .get(&machine)
        .ok_or(SchedulerError::UnknownMachine(machine))?;
    match base.vertex(v)?.operation() {
        Some(op) => Ok(state.asapst()[v.value() as usize] + instance.processing_time(op)),
        None => Ok(0),
    }
}

/// `o` dominates `n` (both already known to share the same job-completion
/// vector) iff `o` finished every machine's committed work no later than `n`
/// and leaves no less room — lower or equal ASAP, no less slack — for every
/// operation neither has scheduled yet. This is the minimization-direction
/// reading of the rule: the only self-consistent one for safely discarding
/// `n` without losing reachable solutions.
fn is_dominated(n: &DdVertex, o: &DdVertex, instance: &Instance, base: &Graph) -> Result<bool> {
    for &m in instance.machines() {
        if completion_at(o, instance, base, m)? > completion_at(n, instance, base, m)? {
            return Ok(false);
        }
    }
    for ops in instance.jobs().values() {
        for &op in ops {
            let v = base.vertex_id_of(op)?;
            if n.scheduled_ops().contains(&v) || o.scheduled_ops().contains(&v) {
                continue;
            }
            let idx = v.value() as usize;
            if o.asapst()[idx] > n.asapst()[idx] {
                return Ok(false);
            }
            let slack_o = o.alapst()[idx] - o.asapst()[idx];
            let slack_n = n.alapst()[idx] - n.asapst()[idx];
            if slack_o < slack_n {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn try_schedule_job(
    instance: &Instance,
    base: &Graph,
    current: &DdVertex,
    job_id: JobId,
    ops: &[Operation],
    total_per_job: &[usize],
    id_gen: &mut IdGenerator,
) -> Result<Option<DdVertex>> {
    let mut local_last = current.last_operation().clone();
    let mut staged: Vec<(MachineId, Edge)> = Vec::new();
    let mut touched: Vec<VertexId> = Vec::new();

    for &op in ops {
        let machine = instance.machine(op)?;
        let prev_v = *local_last
            .get(&machine)
            .ok_or(SchedulerError::UnknownMachine(machine))?;
        let dst_v = base.vertex_id_of(op)?;
        let weight = match base.vertex(prev_v)?.operation() {
            Some(prev_op) => dependent_weight(instance, prev_op, op),
            None => 0,
        };
        staged.push((machine, Edge { src: prev_v, dst: dst_v, weight }));
        local_last.insert(machine, dst_v);
        touched.push(dst_v);
    }

    let mut scratch = base.clone();
    scratch.add_edges(&current.all_edges())?;
    let mut asapst = current.asapst().clone();
    let feasible = {
        let mut overlay = EdgeOverlay::new(&mut scratch);
        let edges: Vec<Edge> = staged.iter().map(|(_, e)| e.clone()).collect();
        overlay.add_edges(&edges)?;
        let cycle = compute_asap_windowed(overlay.graph(), &mut asapst, &[], &touched)?;
        if cycle.is_empty() {
            overlay.commit();
            true
        } else {
            false
        }
    };
    if !feasible {
        return Ok(None);
    }

    let protected = protected_sources(instance, &scratch)?;
    let mut alapst = initialize_alap(&scratch, true)?;
    let cycle = compute_alap(&scratch, &mut alapst, &protected)?;
    if !cycle.is_empty() {
        return Ok(None);
    }

    let mut machine_edges = current.machine_edges().clone();
    let mut scheduled_ops = current.scheduled_ops().clone();
    for (m, e) in &staged {
        machine_edges.entry(*m).or_default().push(e.clone());
        scheduled_ops.insert(e.dst);
    }

    let mut jobs_completion = current.jobs_completion().to_vec();
    let pos = instance.job_output_position(job_id)?;
    jobs_completion[pos] += ops.len();

    let mut job_order = current.job_order().to_vec();
    if !job_order.contains(&job_id) {
        job_order.push(job_id);
    }

    let terminal = jobs_completion
        .iter()
        .zip(total_per_job.iter())
        .all(|(&done, &total)| done >= total);

    let mut child = DdVertex::new(
        StateId::new(id_gen.next_id() as u32),
        machine_edges,
        asapst,
        alapst,
        jobs_completion,
        job_order,
        local_last,
        scheduled_ops,
        current.vertex_depth() + 1,
    );
    child.set_terminal(terminal);
    if !terminal {
        child.set_ready_operations(instance, &scratch)?;
    }
    Ok(Some(child))
}

fn expand(
    instance: &Instance,
    base: &Graph,
    current: &DdVertex,
    total_per_job: &[usize],
    id_gen: &mut IdGenerator,
) -> Result<Vec<DdVertex>> {
    let mut children = Vec::new();
    let ready: Vec<(JobId, Vec<Operation>)> = current
        .ready_ops()
        .iter()
        .map(|(&j, ops)| (j, ops.clone()))
        .collect();
    for (job_id, ops) in ready {
        if let Some(child) = try_schedule_job(instance, base, current, job_id, &ops, total_per_job, id_gen)? {
            children.push(child);
        }
    }
    Ok(children)
}

/// Runs the decision-diagram search to (attempted) optimality, starting from
/// an optional seed job permutation used purely as an initial incumbent.
pub fn solve(instance: &Instance, config: &SolverConfig, seed: Option<&[JobId]>) -> Result<(DdSolution, Option<DdVertex>)> {
    let base = build_search_base(instance)?;
    let mut id_gen = IdGenerator::new();
    let total_per_job: Vec<usize> = instance
        .jobs_output_order()
        .iter()
        .map(|&j| instance.job_operations(j).map(|ops| ops.len()))
        .collect::<Result<_>>()?;

    let mut solution = DdSolution::new(config.rank_factor, instance.total_ops() as u32);
    let mut best_solution: Option<DdVertex> = None;

    if let Some(job_order) = seed {
        if let Some(seeded) = seed_vertex(instance, job_order, &mut id_gen)? {
            solution.set_best_upper_bound(seeded.lower_bound());
            best_solution = Some(seeded);
        }
    }

    let mut queue = Queue::new(config.exploration, config.rank_factor);
    queue.push(initial_vertex(instance, &base, &mut id_gen)?);

    let mut active: HashMap<Vec<usize>, Vec<DdVertex>> = HashMap::new();
    let started = Instant::now();
    let mut iterations: u64 = 0;

    let reason = loop {
        if started.elapsed() >= config.time_budget {
            break TerminationReason::TimeOut;
        }
        if iterations >= config.iteration_limit {
            break TerminationReason::TimeOut;
        }
        let Some(current) = queue.pop() else {
            break if best_solution.is_some() {
                TerminationReason::Optimal
            } else {
                TerminationReason::NoSolution
            };
        };
        iterations += 1;

        if let Some(peers) = active.get(current.jobs_completion()) {
            let dominated = peers
                .iter()
                .filter(|o| o.id() != current.id())
                .any(|o| is_dominated(&current, o, instance, &base).unwrap_or(false));
            if dominated {
                continue;
            }
        }

        if let Some(ub) = best_solution.as_ref().map(|b| b.lower_bound()) {
            if current.lower_bound() >= ub && !current.is_terminal() {
                continue;
            }
        }

        if current.is_terminal() {
            let elapsed = started.elapsed().as_secs_f64();
            let improved = best_solution
                .as_ref()
                .map(|b| current.lower_bound() < b.lower_bound())
                .unwrap_or(true);
            if improved {
                solution.set_best_upper_bound(current.lower_bound());
                solution.record_anytime(elapsed, current.lower_bound());
                best_solution = Some(current);
            }
            continue;
        }

        for child in expand(instance, &base, &current, &total_per_job, &mut id_gen)? {
            if let Some(ub) = best_solution.as_ref().map(|b| b.lower_bound()) {
                if child.lower_bound() >= ub && !child.is_terminal() {
                    continue;
                }
            }
            active.entry(child.jobs_completion().to_vec()).or_default().push(child.clone());
            queue.push(child);
        }

        if let Some(bound) = queue.min_open_bound() {
            solution.set_best_lower_bound(bound);
            solution.record_bound(started.elapsed().as_secs_f64(), bound);
        }
    };

    solution.finish(reason, best_solution.as_ref().map(|b| b.lower_bound()));
    Ok((solution, best_solution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::graph_builder::build_graph;
    use crate::domain::entities::ids::OperationId;
    use crate::domain::entities::instance::{PairTable, ShopType};
    use std::collections::HashMap as Map;
    use std::time::Duration;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    fn two_job_flow_shop() -> Instance {
        let mut jobs = Map::new();
        jobs.insert(JobId(0), vec![op(0, 0), op(0, 1)]);
        jobs.insert(JobId(1), vec![op(1, 0), op(1, 1)]);

        let mut machine_of = Map::new();
        machine_of.insert(op(0, 0), MachineId(0));
        machine_of.insert(op(0, 1), MachineId(1));
        machine_of.insert(op(1, 0), MachineId(0));
        machine_of.insert(op(1, 1), MachineId(1));

        let mut processing_times = Map::new();
        processing_times.insert(op(0, 0), 10);
        processing_times.insert(op(0, 1), 20);
        processing_times.insert(op(1, 0), 15);
        processing_times.insert(op(1, 1), 25);

        Instance::new(
            "flow".to_string(),
            jobs,
            machine_of,
            processing_times,
            0,
            PairTable::new(0),
            PairTable::new(0),
            PairTable::new(i64::MAX),
            PairTable::new(i64::MAX),
            Map::new(),
            ShopType::FlowShop,
            vec![JobId(0), JobId(1)],
            Map::new(),
        )
        .unwrap()
    }

    fn generous_config() -> SolverConfig {
        SolverConfig {
            time_budget: Duration::from_secs(5),
            iteration_limit: 10_000,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn search_finds_a_state_at_least_as_good_as_the_default_order() {
        let instance = two_job_flow_shop();
        let default_graph = build_graph(&instance).unwrap();
        let mut default_asapst = initialize_asap(&default_graph, &[], true).unwrap();
        compute_asap(&default_graph, &mut default_asapst);
        let default_bound = *default_asapst.last().unwrap();

        let (solution, best) = solve(&instance, &generous_config(), None).unwrap();
        let best = best.expect("a flow shop with two jobs always has a feasible schedule");
        assert!(best.lower_bound() <= default_bound);
        assert!(solution.best_upper_bound().is_some());
    }

    #[test]
    fn exhausting_the_open_queue_reports_optimal() {
        let instance = two_job_flow_shop();
        let (solution, best) = solve(&instance, &generous_config(), None).unwrap();
        assert!(best.is_some());
        assert!(solution.is_optimal());
        assert_eq!(solution.termination_reason(), Some(TerminationReason::Optimal));
    }

    #[test]
    fn a_seed_order_becomes_the_initial_incumbent() {
        let instance = two_job_flow_shop();
        let seed_order = vec![JobId(1), JobId(0)];
        let seeded = seed_vertex(&instance, &seed_order, &mut IdGenerator::new())
            .unwrap()
            .expect("seed order is feasible");

        let mut config = generous_config();
        config.time_budget = Duration::from_nanos(1);
        let (_solution, best) = solve(&instance, &config, Some(&seed_order)).unwrap();
        let best = best.expect("the seed itself should be returned when the budget is exhausted immediately");
        assert_eq!(best.lower_bound(), seeded.lower_bound());
    }
}
