//! Translates an `Instance` into a constraint `Graph`.
//!
//! Two builders exist, grounded on `delayGraph/builder.cpp`'s `customOrder`
//! and `jobShop` functions:
//!
//! - [`build_fixed_sequence`] produces the *complete* graph for a given job
//!   permutation (or an externally supplied machine sequence): every
//!   sequencing decision is baked in as a real edge, so a single longest-path
//!   pass gives the schedule's start times directly. Used to evaluate a
//!   sequence file and to validate a finished search result.
//! - [`build_search_base`] produces only the structural skeleton (sources,
//!   intra-job precedence, sequence-independent setup/due-date edges) that
//!   the forward heuristic and decision-diagram search start from; they
//!   commit the remaining inter-job sequencing edges themselves, one
//!   operation at a time, via `PartialSolution`.

use crate::domain::entities::graph::{Edge, Graph};
use crate::domain::entities::ids::{JobId, MachineId};
use crate::domain::entities::instance::{Instance, ShopType};
use crate::domain::entities::operation::Operation;
use crate::domain::entities::partial_solution::MachineEdges;
use crate::error::{Result, SchedulerError};
use std::collections::{HashMap, HashSet};

/// Processing time of `from` plus the fixed (sequence-independent) setup
/// needed before `to` can start. Used for intra-job precedence edges.
pub fn fixed_weight(instance: &Instance, from: Operation, to: Operation) -> i64 {
    instance.processing_time(from) + instance.setup_time_independent(from, to)
}

/// Processing time of `from` plus the sequence-dependent setup incurred by
/// switching from `from` to `to` on the same machine.
pub fn dependent_weight(instance: &Instance, from: Operation, to: Operation) -> i64 {
    instance.processing_time(from) + instance.setup_time(from, to)
}

/// How many passes `op`'s job makes over its machine: the job's declared
/// plexity if the machine is re-entrant, 1 otherwise.
fn re_entrancies_of(instance: &Instance, op: Operation) -> Result<u32> {
    let machine = instance.machine(op)?;
    Ok(if instance.is_re_entrant(machine) {
        instance.plexity_of_op(op).number_of_ops()
    } else {
        1
    })
}

fn last_operation_id_on_machine(instance: &Instance, machine: MachineId) -> Option<u32> {
    instance
        .machine_operations(machine)
        .last()
        .map(|op| op.operation_id.value())
}

fn add_intra_job_edges(graph: &mut Graph, instance: &Instance, ops: &[Operation]) -> Result<()> {
    for w in ops.windows(2) {
        let (from, to) = (w[0], w[1]);
        let src = graph.vertex_id_of(from)?;
        let dst = graph.vertex_id_of(to)?;
        if !graph.has_edge(src, dst) {
            let weight = fixed_weight(instance, from, to);
            graph.add_or_update_edge(src, dst, weight)?;
        }
    }
    Ok(())
}

fn add_sequence_independent_setup_times(graph: &mut Graph, instance: &Instance) -> Result<()> {
    let entries: Vec<(Operation, Operation, i64)> =
        instance.setup_times_independent().entries().collect();
    for (from, to, setup) in entries {
        if !graph.has_vertex(from) || !graph.has_vertex(to) {
            continue;
        }
        let src = graph.vertex_id_of(from)?;
        let dst = graph.vertex_id_of(to)?;
        if !graph.has_edge(src, dst) {
            graph.add_or_update_edge(src, dst, instance.processing_time(from) + setup)?;
        }
    }
    Ok(())
}

/// Bakes every explicit sequence-independent due date in as a back-edge: a
/// due date `(u, v, d)` means `t(v) - t(u) <= d`, represented as `v -> u`
/// weight `-d`. Mirrors the builder's literal orientation, which stores the
/// pair the other way around (`u` precedes `v` in the flow is rejected as
/// incoherent), so the edge is added `u -> v` weight `-d` to match.
fn add_sequence_independent_due_dates(graph: &mut Graph, instance: &Instance) -> Result<()> {
    let entries: Vec<(Operation, Operation, i64)> =
        instance.due_dates_independent().entries().collect();
    for (from, to, due) in entries {
        if !graph.has_vertex(from) || !graph.has_vertex(to) {
            continue;
        }
        if from.job_id <= to.job_id && from.operation_id <= to.operation_id {
            return Err(SchedulerError::IncoherentDueDate { from, to });
        }
        let src = graph.vertex_id_of(from)?;
        let dst = graph.vertex_id_of(to)?;
        graph.add_or_update_edge(src, dst, -due)?;
    }
    Ok(())
}

/// Builds the skeleton graph forward-heuristic/DD search start from: machine
/// sources, every operation vertex, intra-job precedence edges, and every
/// sequence-independent setup time / due date. No inter-job sequencing edges
/// are added — those are exactly what the search commits.
pub fn build_search_base(instance: &Instance) -> Result<Graph> {
    let mut g = Graph::new();
    for &m in instance.machines() {
        g.add_source(m);
    }
    for &jid in instance.jobs_in_id_order() {
        for &op in instance.job_operations(jid)? {
            g.add_operation(op);
        }
    }
    if instance.shop_type() == ShopType::JobShop {
        g.add_terminus();
    }

    add_sequence_independent_setup_times(&mut g, instance)?;
    for &jid in instance.jobs_in_id_order() {
        add_intra_job_edges(&mut g, instance, instance.job_operations(jid)?)?;
    }
    add_sequence_independent_due_dates(&mut g, instance)?;

    if instance.shop_type() == ShopType::JobShop {
        let terminus = g.terminus().expect("terminus just added");
        for &jid in instance.jobs_in_id_order() {
            let ops = instance.job_operations(jid)?;
            let last = *ops
                .last()
                .ok_or_else(|| SchedulerError::InconsistentInput(format!("job {jid} has no operations")))?;
            let v = g.vertex_id_of(last)?;
            g.add_edge(v, terminus, instance.processing_time(last))?;
        }
        for &jid in instance.jobs_in_id_order() {
            if let Some(due) = instance.absolute_due_date(jid) {
                let ops = instance.job_operations(jid)?;
                let last = *ops.last().expect("validated non-empty above");
                let v = g.vertex_id_of(last)?;
                for &m in instance.machines() {
                    let src = g.source_of(m)?;
                    g.add_edge(v, src, -due)?;
                }
            }
        }
    }

    Ok(g)
}

/// Builds the full constraint graph for `FixedOrder`/`FlowShop` instances,
/// wiring every inter-job edge per the given `job_order` (the "first job
/// with a matching operation id and matching plexity" rule).
fn build_custom_order(instance: &Instance, job_order: &[JobId]) -> Result<Graph> {
    let mut g = build_search_base_no_inter(instance)?;

    let mut duplex_found: HashSet<MachineId> = HashSet::new();
    for (idx, &jid) in job_order.iter().enumerate() {
        for &op in instance.job_operations(jid)? {
            let machine = instance.machine(op)?;
            let max_re_entrancies = instance.machine_operations(machine).len() as u32;
            let re_entrancies = re_entrancies_of(instance, op)?;
            let matches_max = re_entrancies == max_re_entrancies && !duplex_found.contains(&machine);
            if matches_max {
                duplex_found.insert(machine);
            }
            if idx == 0 || matches_max {
                let src = g.source_of(machine)?;
                let dst = g.vertex_id_of(op)?;
                g.add_edge(src, dst, 0)?;
            }
        }
    }

    for (idx, &jid) in job_order.iter().enumerate() {
        add_intra_job_edges(&mut g, instance, instance.job_operations(jid)?)?;
        if idx == 0 {
            continue;
        }
        add_inter_job_edges(&mut g, instance, job_order, idx)?;
    }

    add_sequence_independent_due_dates(&mut g, instance)?;

    if instance.shop_type() == ShopType::FixedOrder {
        for w in job_order.windows(2) {
            let (prev, next) = (w[0], w[1]);
            let src_op = *instance
                .job_operations(prev)?
                .first()
                .ok_or_else(|| SchedulerError::InconsistentInput(format!("job {prev} has no operations")))?;
            let dst_op = *instance
                .job_operations(next)?
                .first()
                .ok_or_else(|| SchedulerError::InconsistentInput(format!("job {next} has no operations")))?;
            let src = g.vertex_id_of(src_op)?;
            let dst = g.vertex_id_of(dst_op)?;
            let weight = dependent_weight(instance, src_op, dst_op);
            g.add_edge(src, dst, weight)?;
        }
    }

    Ok(g)
}

fn build_search_base_no_inter(instance: &Instance) -> Result<Graph> {
    let mut g = Graph::new();
    for &m in instance.machines() {
        g.add_source(m);
    }
    for &jid in instance.jobs_in_id_order() {
        for &op in instance.job_operations(jid)? {
            g.add_operation(op);
        }
    }
    add_sequence_independent_setup_times(&mut g, instance)?;
    Ok(g)
}

fn add_inter_job_edges(graph: &mut Graph, instance: &Instance, job_order: &[JobId], idx: usize) -> Result<()> {
    let jid = job_order[idx];
    for &op in instance.job_operations(jid)? {
        let machine = instance.machine(op)?;
        let is_first_machine_in_order = instance.machines().first() == Some(&machine);
        let last_op_id = last_operation_id_on_machine(instance, machine);
        let is_last_op_in_machine = last_op_id == Some(op.operation_id.value());
        let re_entrancies = re_entrancies_of(instance, op)?;

        for back in 1..=idx {
            let jid2 = job_order[idx - back];
            let candidate = Operation::new(jid2, op.operation_id);
            if !instance.is_valid_operation(candidate) {
                continue;
            }
            if instance.machine(candidate)? != machine {
                continue;
            }
            let is_previous_job = back == 1;
            let must_connect = is_previous_job && is_last_op_in_machine;
            if re_entrancies_of(instance, candidate)? != re_entrancies && !must_connect {
                continue;
            }
            if is_first_machine_in_order {
                use crate::domain::entities::ids::ReEntrantId;
                if instance.plexity(jid, ReEntrantId(0)) != instance.plexity(jid2, ReEntrantId(0)) {
                    continue;
                }
            }
            let src = graph.vertex_id_of(candidate)?;
            let dst = graph.vertex_id_of(op)?;
            let weight = dependent_weight(instance, candidate, op);
            graph.add_edge(src, dst, weight)?;
            break;
        }
    }
    Ok(())
}

/// Builds the full constraint graph for `JobShop` instances: intra-job
/// precedence, a shared terminus, and (for the `FixedOrder` rough edge
/// preserved literally from the original) same-level edges between
/// consecutive jobs in the output order, skipping operation ids 1 and 2.
fn build_job_shop(instance: &Instance) -> Result<Graph> {
    let mut g = build_search_base(instance)?;

    if instance.shop_type() == ShopType::FixedOrder {
        let order = instance.jobs_output_order();
        for w in 1..order.len() {
            for &op in instance.job_operations(order[w])? {
                if op.operation_id.value() == 1 || op.operation_id.value() == 2 {
                    continue;
                }
                let src_op = Operation::new(order[w - 1], op.operation_id);
                if !instance.is_valid_operation(src_op) {
                    continue;
                }
                let src = g.vertex_id_of(src_op)?;
                let dst = g.vertex_id_of(op)?;
                let weight = dependent_weight(instance, src_op, op);
                g.add_edge(src, dst, weight)?;
            }
        }
    }

    Ok(g)
}

/// Builds the full constraint graph for a given job permutation. For
/// `FixedOrder`/`FlowShop` instances this wires every inter-job sequencing
/// edge per `job_order`; for `JobShop` instances `job_order` is ignored (job
/// shops route each job through machines independently).
pub fn build_fixed_sequence(instance: &Instance, job_order: &[JobId]) -> Result<Graph> {
    match instance.shop_type() {
        ShopType::JobShop => build_job_shop(instance),
        ShopType::FixedOrder | ShopType::FlowShop => build_custom_order(instance, job_order),
    }
}

/// Builds the graph using the instance's own declared order (output order
/// for fixed-order shops, id order otherwise).
pub fn build_graph(instance: &Instance) -> Result<Graph> {
    let order: Vec<JobId> = if instance.shop_type() == ShopType::FixedOrder {
        instance.jobs_output_order().to_vec()
    } else {
        instance.jobs_in_id_order().to_vec()
    };
    build_fixed_sequence(instance, &order)
}

fn ops_per_job_on_machine(instance: &Instance, machine: MachineId) -> HashMap<JobId, Vec<Operation>> {
    let mut map: HashMap<JobId, Vec<Operation>> = HashMap::new();
    for &op in instance.machine_operations(machine) {
        map.entry(op.job_id).or_default().push(op);
    }
    map
}

/// Builds the graph the forward heuristic starts from: every machine is
/// fully sequenced in `job_order` except that, on each re-entrant machine,
/// only the *first* pass of every job is chained up front. Each re-entrant
/// machine's remaining (non-first) passes are left for the heuristic to
/// interleave, and are handed back as that machine's initial
/// [`MachineEdges`] entry — a chain terminated by a placeholder edge back to
/// the machine's own source vertex, which `PartialSolution::add` splits to
/// insert the next pass (mirroring `createInitialSequence` in
/// `forwardheuristic.cpp`, generalized from "duplex jobs only" to "every
/// job's first visit, on every re-entrant machine" so that instances with
/// more than one re-entrant machine or plexities beyond duplex are handled
/// the same way).
///
/// The placeholder edge is never added to the real graph — only to the
/// returned sequence — since it carries no constraint of its own; the
/// machine-source vertex's ASAP time is pinned at zero by initialization
/// and must not be perturbed by a windowed relaxation reaching back into it.
pub fn build_for_forward_heuristic(instance: &Instance, job_order: &[JobId]) -> Result<(Graph, MachineEdges)> {
    let mut g = build_search_base(instance)?;
    let reentrant: HashSet<MachineId> = instance.re_entrant_machines().into_iter().collect();
    let mut chosen_edges = MachineEdges::new();

    for &m in instance.machines() {
        let per_job = ops_per_job_on_machine(instance, m);
        let src = g.source_of(m)?;

        if reentrant.contains(&m) {
            let mut prev_v = src;
            let mut prev_op: Option<Operation> = None;
            for &jid in job_order {
                let Some(ops) = per_job.get(&jid) else { continue };
                let Some(&first) = ops.first() else { continue };
                let v = g.vertex_id_of(first)?;
                let weight = prev_op.map(|p| dependent_weight(instance, p, first)).unwrap_or(0);
                g.add_edge(prev_v, v, weight)?;
                prev_v = v;
                prev_op = Some(first);
            }
            let tail = Edge { src: prev_v, dst: src, weight: 0 };
            chosen_edges.insert(m, vec![tail]);
        } else {
            let mut prev_v = src;
            let mut prev_op: Option<Operation> = None;
            for &jid in job_order {
                let Some(ops) = per_job.get(&jid) else { continue };
                for &op in ops {
                    let v = g.vertex_id_of(op)?;
                    let weight = prev_op.map(|p| dependent_weight(instance, p, op)).unwrap_or(0);
                    g.add_edge(prev_v, v, weight)?;
                    prev_v = v;
                    prev_op = Some(op);
                }
            }
        }
    }

    if instance.shop_type() == ShopType::FixedOrder {
        for w in job_order.windows(2) {
            let (prev, next) = (w[0], w[1]);
            let src_op = *instance
                .job_operations(prev)?
                .first()
                .ok_or_else(|| SchedulerError::InconsistentInput(format!("job {prev} has no operations")))?;
            let dst_op = *instance
                .job_operations(next)?
                .first()
                .ok_or_else(|| SchedulerError::InconsistentInput(format!("job {next} has no operations")))?;
            let src = g.vertex_id_of(src_op)?;
            let dst = g.vertex_id_of(dst_op)?;
            let weight = dependent_weight(instance, src_op, dst_op);
            g.add_edge(src, dst, weight)?;
        }
    }

    Ok((g, chosen_edges))
}

/// Every operation beyond a job's first visit to `machine`, in job-then-pass
/// order — the operations [`build_for_forward_heuristic`] leaves uncommitted
/// for the search to interleave.
pub fn remaining_passes(instance: &Instance, machine: MachineId, job_order: &[JobId]) -> Vec<(JobId, Operation)> {
    let per_job = ops_per_job_on_machine(instance, machine);
    let mut out = Vec::new();
    for &jid in job_order {
        if let Some(ops) = per_job.get(&jid) {
            for &op in ops.iter().skip(1) {
                out.push((jid, op));
            }
        }
    }
    out
}

/// Builds the graph for a fully externally-specified schedule: every
/// machine's operations are chained in exactly the order `sequences` gives,
/// with no remaining choice left for a search to make. Every operation the
/// instance assigns to a machine must appear exactly once in that machine's
/// sequence.
pub fn build_from_machine_sequences(
    instance: &Instance,
    sequences: &HashMap<MachineId, Vec<Operation>>,
) -> Result<(Graph, MachineEdges)> {
    let mut g = build_search_base(instance)?;
    let mut chosen_edges = MachineEdges::new();

    for &m in instance.machines() {
        let expected: HashSet<Operation> = instance.machine_operations(m).iter().copied().collect();
        let given = sequences
            .get(&m)
            .ok_or_else(|| SchedulerError::InconsistentInput(format!("sequence file is missing machine {m}")))?;
        let given_set: HashSet<Operation> = given.iter().copied().collect();
        if given_set != expected || given.len() != expected.len() {
            return Err(SchedulerError::InconsistentInput(format!(
                "sequence for machine {m} does not match the instance's operations on that machine"
            )));
        }

        let src = g.source_of(m)?;
        let mut prev_v = src;
        let mut prev_op: Option<Operation> = None;
        let mut edges = Vec::with_capacity(given.len());
        for &op in given {
            let v = g.vertex_id_of(op)?;
            let weight = prev_op.map(|p| dependent_weight(instance, p, op)).unwrap_or(0);
            g.add_edge(prev_v, v, weight)?;
            edges.push(Edge { src: prev_v, dst: v, weight });
            prev_v = v;
            prev_op = Some(op);
        }
        chosen_edges.insert(m, edges);
    }

    Ok((g, chosen_edges))
}
