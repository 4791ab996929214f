//! Greedy, ranked insertion construction heuristic.
//!
//! Every machine except the re-entrant ones is fully sequenced up front in
//! job-output order — there is no genuine choice to make there, since each
//! job visits such a machine at most once. On a re-entrant machine, only
//! every job's *first* visit is pre-chained; the remaining (later) visits
//! are the ones this heuristic interleaves, one at a time, job-by-job,
//! pass-by-pass, each time picking the best-ranked insertion point among
//! every position currently open on that machine's sequence.
//!
//! Grounded on `solvers/forwardheuristic.h`: `createInitialSequence`,
//! `createOptions`, `evaluate_option_feasibility`, `scheduleOneOperation`,
//! and `rankSolutions`. The original supports exactly one re-entrant machine
//! with exactly two passes per job (duplex); this generalizes to any number
//! of re-entrant machines and any number of passes.

use crate::application::services::edge_overlay::EdgeOverlay;
use crate::application::services::graph_builder::{build_for_forward_heuristic, dependent_weight, remaining_passes};
use crate::application::services::longest_path::{compute_asap, compute_asap_windowed, initialize_asap, PathTimes};
use crate::domain::entities::graph::{Edge, Graph};
use crate::domain::entities::ids::{JobId, MachineId};
use crate::domain::entities::instance::{Instance, ShopType};
use crate::domain::entities::operation::Operation;
use crate::domain::entities::option::{IdGenerator, SchedulingOption};
use crate::domain::entities::partial_solution::PartialSolution;
use crate::domain::value_objects::solver_config::SolverConfig;
use crate::error::{Result, SchedulerError};

/// The smallest deadline (sequence-dependent or -independent) declared for
/// any pair starting at `op`; `i64::MAX` if none.
fn smallest_outgoing_deadline(instance: &Instance, op: Operation) -> i64 {
    instance
        .due_dates()
        .entries()
        .chain(instance.due_dates_independent().entries())
        .filter(|(from, _, _)| *from == op)
        .map(|(_, _, d)| d)
        .min()
        .unwrap_or(i64::MAX)
}

fn enumerate_options(
    graph: &Graph,
    solution: &PartialSolution,
    instance: &Instance,
    machine: MachineId,
    new_op: Operation,
) -> Result<Vec<SchedulingOption>> {
    let edges = solution.chosen_edges(machine);
    let start = solution.first_feasible_edge(machine);
    let new_v = graph.vertex_id_of(new_op)?;
    let deadline = smallest_outgoing_deadline(instance, new_op);

    let mut options = Vec::new();
    let mut cumulative = 0i64;
    for (i, edge) in edges.iter().enumerate().skip(start) {
        let prev_op = graph.vertex(edge.src)?.operation();
        let next_op = graph.vertex(edge.dst)?.operation();

        // never insert directly ahead of the same job's own next operation
        if next_op.map(|n| n.job_id) == Some(new_op.job_id) {
            cumulative += edge.weight;
            if cumulative > deadline {
                break;
            }
            continue;
        }

        let prev_weight = prev_op.map(|op| dependent_weight(instance, op, new_op)).unwrap_or(0);
        let next_weight = next_op.map(|op| dependent_weight(instance, new_op, op)).unwrap_or(0);

        let prev_edge = Edge { src: edge.src, dst: new_v, weight: prev_weight };
        let next_edge = Edge { src: new_v, dst: edge.dst, weight: next_weight };
        options.push(SchedulingOption::new(
            prev_edge, next_edge, edge.src, new_v, edge.dst, i, false,
        ));

        cumulative += edge.weight;
        if cumulative > deadline {
            break;
        }
    }
    Ok(options)
}

/// Tests whether committing `option` keeps the schedule feasible, without
/// mutating `graph`. Relaxation is windowed to `option.cur_v`'s job: any
/// attempt to re-time an earlier job's vertex is itself an infeasibility
/// signal (that job's schedule is already committed).
fn check_feasibility(graph: &Graph, solution: &PartialSolution, option: &SchedulingOption) -> Result<Option<PathTimes>> {
    let mut scratch = graph.clone();
    let mut overlay = EdgeOverlay::new(&mut scratch);
    overlay.add_edges(&[option.prev_edge.clone(), option.next_edge.clone()])?;

    let mut asapst = solution.asapst().clone();
    let window = [option.cur_v];
    let positive_cycle = compute_asap_windowed(overlay.graph(), &mut asapst, &[], &window)?;
    if positive_cycle.is_empty() {
        Ok(Some(asapst))
    } else {
        Ok(None)
    }
}

struct Scored {
    option: SchedulingOption,
    asapst: PathTimes,
    push: i64,
    push_next: i64,
    ops_in_loop: u32,
}

/// How many already-committed operations sit between the insertion point
/// and this job's own previous pass on the same machine (or the machine's
/// source, whichever is reached first walking back).
fn nr_ops_in_loop(graph: &Graph, solution: &PartialSolution, machine: MachineId, new_op: Operation, position: usize) -> Result<u32> {
    let edges = solution.chosen_edges(machine);
    let mut count = 1u32;
    let mut idx = position;
    while idx > 0 {
        idx -= 1;
        let e = &edges[idx];
        if graph.is_source(e.src)? {
            break;
        }
        let src_op = graph.vertex(e.src)?.operation();
        if src_op.map(|o| o.job_id) == Some(new_op.job_id) {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// Picks the single best candidate by normalizing each objective to `[0,1]`
/// across the whole candidate set and combining with the configured
/// weights; minimizes `push` and `push_next`, maximizes `ops_in_loop`.
fn rank_options(config: &SolverConfig, candidates: Vec<Scored>) -> Scored {
    let (p_lo, p_hi) = candidates.iter().fold((i64::MAX, i64::MIN), |(lo, hi), c| (lo.min(c.push), hi.max(c.push)));
    let (n_lo, n_hi) = candidates
        .iter()
        .fold((i64::MAX, i64::MIN), |(lo, hi), c| (lo.min(c.push_next), hi.max(c.push_next)));
    let (l_lo, l_hi) = candidates
        .iter()
        .fold((u32::MAX, u32::MIN), |(lo, hi), c| (lo.min(c.ops_in_loop), hi.max(c.ops_in_loop)));

    let norm_i = |v: i64, lo: i64, hi: i64| if hi > lo { (v - lo) as f64 / (hi - lo) as f64 } else { 0.0 };
    let norm_u = |v: u32, lo: u32, hi: u32| if hi > lo { (v - lo) as f64 / (hi - lo) as f64 } else { 0.0 };

    candidates
        .into_iter()
        .map(|c| {
            let rank = config.w_prod * norm_i(c.push, p_lo, p_hi)
                + config.w_flex * norm_i(c.push_next, n_lo, n_hi)
                + config.w_tie * (1.0 - norm_u(c.ops_in_loop, l_lo, l_hi));
            (rank, c)
        })
        .min_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c)
        .expect("candidates must be non-empty")
}

/// Schedules `new_op` onto `machine`'s interleaved sequence, committing the
/// chosen edges into both `graph` and the returned `PartialSolution`.
fn schedule_one_operation(
    graph: &mut Graph,
    instance: &Instance,
    solution: &PartialSolution,
    machine: MachineId,
    new_op: Operation,
    config: &SolverConfig,
    id_gen: &mut IdGenerator,
) -> Result<PartialSolution> {
    let mut candidates = Vec::new();
    for option in enumerate_options(graph, solution, instance, machine, new_op)? {
        if let Some(asapst) = check_feasibility(graph, solution, &option)? {
            let push = asapst[option.cur_v.value() as usize] - solution.asapst()[option.cur_v.value() as usize];
            let push_next = asapst[option.next_v.value() as usize] - solution.asapst()[option.next_v.value() as usize];
            let ops_in_loop = nr_ops_in_loop(graph, solution, machine, new_op, option.position)?;
            candidates.push(Scored { option, asapst, push, push_next, ops_in_loop });
        }
    }

    if candidates.is_empty() {
        return Err(SchedulerError::NoFeasibleOption(new_op.job_id));
    }

    let chosen = rank_options(config, candidates);

    let split_prev = chosen.option.prev_v;
    let split_next = chosen.option.next_v;
    graph.remove_edge(split_prev, split_next)?;
    graph.add_edge(split_prev, chosen.option.cur_v, chosen.option.prev_edge.weight)?;
    // the tail placeholder (back to the machine's own source) is bookkeeping
    // only, never a real constraint — committing it would let a windowed
    // relaxation push the source's pinned ASAP time upward.
    if graph.is_visible(split_next)? {
        graph.add_edge(chosen.option.cur_v, split_next, chosen.option.next_edge.weight)?;
    }

    let mut next = solution.add(machine, &chosen.option, chosen.asapst, id_gen);
    next.set_makespan_last_scheduled_job(chosen.push);
    next.set_earliest_start_future_operation(chosen.push_next);
    next.set_nr_ops_in_loop(chosen.ops_in_loop);
    Ok(next)
}

/// Builds the forward-heuristic starting graph and schedules every
/// re-entrant machine's remaining passes, job by job. Returns the final
/// partial solution alongside the graph it was validated against.
pub fn solve(instance: &Instance, config: &SolverConfig) -> Result<(PartialSolution, Graph)> {
    let job_order: Vec<JobId> = if instance.shop_type() == ShopType::FixedOrder {
        instance.jobs_output_order().to_vec()
    } else {
        instance.jobs_in_id_order().to_vec()
    };

    let (mut graph, chosen_edges) = build_for_forward_heuristic(instance, &job_order)?;

    let mut id_gen = IdGenerator::new();
    let mut asapst = initialize_asap(&graph, &[], true)?;
    let cycle = compute_asap(&graph, &mut asapst);
    if !cycle.is_empty() {
        return Err(SchedulerError::PositiveCycleDetected(
            cycle.into_iter().map(|e| (e.src, e.dst, e.weight)).collect(),
        ));
    }

    let mut solution = PartialSolution::new(chosen_edges, asapst, &mut id_gen);

    for &machine in instance.re_entrant_machines().iter() {
        for (_, op) in remaining_passes(instance, machine, &job_order) {
            solution = schedule_one_operation(&mut graph, instance, &solution, machine, op, config, &mut id_gen)?;
        }
    }

    Ok((solution, graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ids::{MachineId as Mid, OperationId};
    use crate::domain::entities::instance::PairTable;
    use std::collections::HashMap;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    fn two_duplex_jobs_one_reentrant_machine() -> Instance {
        // Both jobs visit machine 1 twice (operation ids 1 and 2); machine 0
        // and 2 are each visited once.
        let mut jobs = HashMap::new();
        jobs.insert(JobId(0), vec![op(0, 0), op(0, 1), op(0, 2), op(0, 3)]);
        jobs.insert(JobId(1), vec![op(1, 0), op(1, 1), op(1, 2), op(1, 3)]);

        let mut machine_of = HashMap::new();
        for j in 0..2 {
            machine_of.insert(op(j, 0), Mid(0));
            machine_of.insert(op(j, 1), Mid(1));
            machine_of.insert(op(j, 2), Mid(1));
            machine_of.insert(op(j, 3), Mid(2));
        }

        let mut processing_times = HashMap::new();
        for j in 0..2 {
            processing_times.insert(op(j, 0), 5);
            processing_times.insert(op(j, 1), 5);
            processing_times.insert(op(j, 2), 5);
            processing_times.insert(op(j, 3), 5);
        }

        Instance::new(
            "reentrant".to_string(),
            jobs,
            machine_of,
            processing_times,
            0,
            PairTable::new(0),
            PairTable::new(0),
            PairTable::new(i64::MAX),
            PairTable::new(i64::MAX),
            HashMap::new(),
            ShopType::FlowShop,
            vec![JobId(0), JobId(1)],
            HashMap::new(),
        )
        .unwrap()
    }

    fn two_job_flow_shop_no_reentrancy() -> Instance {
        let mut jobs = HashMap::new();
        jobs.insert(JobId(0), vec![op(0, 0), op(0, 1)]);
        jobs.insert(JobId(1), vec![op(1, 0), op(1, 1)]);

        let mut machine_of = HashMap::new();
        machine_of.insert(op(0, 0), Mid(0));
        machine_of.insert(op(0, 1), Mid(1));
        machine_of.insert(op(1, 0), Mid(0));
        machine_of.insert(op(1, 1), Mid(1));

        let mut processing_times = HashMap::new();
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
            HashMap::new(),
            ShopType::FlowShop,
            vec![JobId(0), JobId(1)],
            HashMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn schedules_every_remaining_pass_without_error() {
        let instance = two_duplex_jobs_one_reentrant_machine();
        let config = SolverConfig::default();
        let (solution, graph) = solve(&instance, &config).unwrap();
        let makespan = solution.real_makespan(&instance, &graph).unwrap();
        assert!(makespan > 0);
    }

    #[test]
    fn no_positive_cycle_remains_after_interleaving() {
        let instance = two_duplex_jobs_one_reentrant_machine();
        let config = SolverConfig::default();
        let (_, graph) = solve(&instance, &config).unwrap();
        let mut asapst = initialize_asap(&graph, &[], true).unwrap();
        let cycle = compute_asap(&graph, &mut asapst);
        assert!(cycle.is_empty());
    }

    #[test]
    fn both_duplex_passes_end_up_sequenced_on_the_reentrant_machine() {
        let instance = two_duplex_jobs_one_reentrant_machine();
        let config = SolverConfig::default();
        let (solution, graph) = solve(&instance, &config).unwrap();
        let v02 = graph.vertex_id_of(op(0, 2)).unwrap();
        let v12 = graph.vertex_id_of(op(1, 2)).unwrap();
        assert!(graph.has_edge(v02, v12) || graph.has_edge(v12, v02));
        let asap = solution.asapst();
        assert!(asap[v02.value() as usize] != asap[v12.value() as usize]);
    }

    #[test]
    fn instance_with_no_reentrant_machines_needs_no_interleaving() {
        let instance = two_job_flow_shop_no_reentrancy();
        assert!(instance.re_entrant_machines().is_empty());
        let config = SolverConfig::default();
        let (solution, graph) = solve(&instance, &config).unwrap();
        // no interleaving loop ever runs; the makespan is whatever the
        // pre-chained skeleton already implies.
        assert!(solution.real_makespan(&instance, &graph).unwrap() > 0);
    }
}
