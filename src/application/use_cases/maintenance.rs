//! Post-processing pass that inserts maintenance actions into an already
//! committed schedule.
//!
//! Grounded on `original_source/maintenanceheuristic.h/.cpp`: the original
//! walks each machine's chosen edges, tracks idle time per sheet size
//! against a table of per-maintenance-type thresholds and durations, and
//! triggers whichever type's interval has elapsed. This pass carries a
//! single cumulative processing-time budget and a single duration per
//! machine instead of the sheet-size table — the simplified policy named in
//! `SPEC_FULL.md` §4.7. Feasibility re-validation reuses the same
//! overlay-and-windowed-check pattern `forward_heuristic::check_feasibility`
//! uses for ordinary operations.

use crate::application::services::edge_overlay::EdgeOverlay;
use crate::application::services::longest_path::compute_asap_windowed;
use crate::domain::entities::delay::ASAP_NEG_INF;
use crate::domain::entities::graph::{Edge, Graph};
use crate::domain::entities::ids::MachineId;
use crate::domain::entities::instance::Instance;
use crate::domain::entities::option::{IdGenerator, SchedulingOption};
use crate::domain::entities::partial_solution::PartialSolution;
use crate::error::{Result, SchedulerError};

/// Maintenance class tag used for every vertex this pass inserts. The
/// simplified policy has one maintenance type, not the original's table of
/// per-type classes.
const MAINT_CLASS: u32 = 0;

/// Walks every machine's chosen sequence and inserts a maintenance action
/// wherever cumulative processing time since the last one (or since the
/// start of the sequence) reaches `interval`. Mutates `graph` in place and
/// returns the updated solution. Returns `MaintenanceInfeasible` without
/// committing anything for the offending machine if an insertion would
/// create a positive cycle.
pub fn apply(
    instance: &Instance,
    graph: &mut Graph,
    mut solution: PartialSolution,
    interval: i64,
    duration: i64,
    id_gen: &mut IdGenerator,
) -> Result<PartialSolution> {
    for &machine in instance.machines() {
        solution = apply_to_machine(instance, graph, solution, machine, interval, duration, id_gen)?;
    }
    Ok(solution)
}

fn apply_to_machine(
    instance: &Instance,
    graph: &mut Graph,
    mut solution: PartialSolution,
    machine: MachineId,
    interval: i64,
    duration: i64,
    id_gen: &mut IdGenerator,
) -> Result<PartialSolution> {
    let mut accumulated = 0i64;
    let mut i = solution.first_maint_edge(machine);

    while i < solution.chosen_edges(machine).len() {
        let edge = solution.chosen_edges(machine)[i].clone();
        let proc_time = graph
            .vertex(edge.src)?
            .operation()
            .map(|op| instance.processing_time(op))
            .unwrap_or(0);
        accumulated += proc_time;

        if accumulated < interval {
            i += 1;
            continue;
        }

        solution = insert_maintenance(graph, &solution, machine, i, duration, id_gen)?;
        accumulated = 0;
        // the edge just examined is now split into prev->maint and
        // maint->next; resume scanning after the inserted pair.
        i += 2;
    }

    Ok(solution)
}

/// Splits `solution`'s `i`-th edge on `machine` with a maintenance vertex,
/// checks feasibility with a windowed ASAP recompute, and either commits the
/// insertion or rolls it back and reports `MaintenanceInfeasible`.
fn insert_maintenance(
    graph: &mut Graph,
    solution: &PartialSolution,
    machine: MachineId,
    i: usize,
    duration: i64,
    id_gen: &mut IdGenerator,
) -> Result<PartialSolution> {
    let edge = solution.chosen_edges(machine)[i].clone();
    let maint_vertex = graph.add_maintenance(MAINT_CLASS);

    let prev_edge = Edge { src: edge.src, dst: maint_vertex, weight: edge.weight };
    let next_edge = Edge { src: maint_vertex, dst: edge.dst, weight: duration };

    let mut asapst = solution.asapst().clone();
    asapst.push(ASAP_NEG_INF);

    let mut overlay = EdgeOverlay::new(graph);
    overlay.add_edges(&[prev_edge.clone(), next_edge.clone()])?;
    // `edge.src` must be in the window too: the maintenance vertex is brand
    // new and starts at `-inf`, so its own ASAP has to be seeded by relaxing
    // its predecessor's outgoing edge in the same pass.
    let positive_cycle = compute_asap_windowed(overlay.graph(), &mut asapst, &[], &[edge.src, maint_vertex])?;

    if !positive_cycle.is_empty() {
        // overlay drops here, rolling back prev_edge/next_edge; the
        // original edge.src -> edge.dst edge was never touched.
        return Err(SchedulerError::MaintenanceInfeasible(machine));
    }
    overlay.commit();
    graph.remove_edge(edge.src, edge.dst)?;

    let option = SchedulingOption::new(prev_edge, next_edge, edge.src, maint_vertex, edge.dst, i, true);
    Ok(solution.add(machine, &option, asapst, id_gen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::graph::VertexId;
    use crate::domain::entities::ids::{JobId, OperationId};
    use crate::domain::entities::instance::{Instance, PairTable, ShopType};
    use crate::domain::entities::operation::Operation;
    use crate::application::services::longest_path::{compute_asap, initialize_asap};
    use std::collections::HashMap;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    /// Two operations of one job on a single machine, long enough that one
    /// maintenance action fits comfortably inside the budget.
    fn single_machine_instance() -> Instance {
        let mut processing_times = HashMap::new();
        processing_times.insert(op(0, 0), 10);
        processing_times.insert(op(1, 0), 10);
        let mut machine_of = HashMap::new();
        machine_of.insert(op(0, 0), MachineId(0));
        machine_of.insert(op(1, 0), MachineId(0));
        let mut jobs = HashMap::new();
        jobs.insert(JobId(0), vec![op(0, 0)]);
        jobs.insert(JobId(1), vec![op(1, 0)]);

        Instance::new(
            "maintenance-fixture".into(),
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
        .expect("fixture instance must be well-formed")
    }

    fn build_graph_and_solution(instance: &Instance) -> (Graph, PartialSolution) {
        let mut graph = Graph::new();
        let src = graph.add_source(MachineId(0));
        let a = graph.add_operation(op(0, 0));
        let b = graph.add_operation(op(1, 0));
        graph.add_or_update_edge(src, a, 0).unwrap();
        graph.add_or_update_edge(a, b, instance.processing_time(op(0, 0))).unwrap();

        let mut asapst = initialize_asap(&graph, &[], true).unwrap();
        compute_asap(&graph, &mut asapst);

        let mut edges = HashMap::new();
        edges.insert(
            MachineId(0),
            vec![
                Edge { src, dst: a, weight: 0 },
                Edge { src: a, dst: b, weight: 10 },
            ],
        );
        let mut id_gen = IdGenerator::new();
        let solution = PartialSolution::new(edges, asapst, &mut id_gen);
        (graph, solution)
    }

    #[test]
    fn inserts_a_maintenance_vertex_once_the_budget_is_exceeded() {
        let instance = single_machine_instance();
        let (mut graph, solution) = build_graph_and_solution(&instance);
        let mut id_gen = IdGenerator::new();

        let result = apply(&instance, &mut graph, solution, 10, 5, &mut id_gen).unwrap();

        assert_eq!(result.maint_count(), 1);
        let edges = result.chosen_edges(MachineId(0));
        assert_eq!(edges.len(), 3, "one edge must have been split into two");
        let maint_id: VertexId = edges[1].dst;
        assert!(graph.is_maint(maint_id).unwrap());
    }

    #[test]
    fn leaves_the_schedule_untouched_when_the_budget_is_never_reached() {
        let instance = single_machine_instance();
        let (mut graph, solution) = build_graph_and_solution(&instance);
        let mut id_gen = IdGenerator::new();

        let result = apply(&instance, &mut graph, solution, 1_000, 5, &mut id_gen).unwrap();

        assert_eq!(result.maint_count(), 0);
        assert_eq!(result.chosen_edges(MachineId(0)).len(), 2);
    }
}
