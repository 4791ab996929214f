//! Renders a finished schedule to JSON, CBOR, or a plain text grid, and
//! writes the standardized exit-report JSON.
//!
//! Grounded on the teacher's `JsonGenerator` (`serde_json::to_string_pretty`
//! plus a `File::create`/`write_all` pair); the text grid reuses the
//! `csv` crate the teacher carries for its own CSV export, and the binary
//! form is written with `ciborium`, the crate that fills the gap the
//! original's `nlohmann::json::to_cbor` call leaves in a Rust stack with no
//! CBOR writer of its own (see `DESIGN.md`).

use crate::domain::entities::graph::Graph;
use crate::domain::entities::instance::Instance;
use crate::domain::entities::partial_solution::PartialSolution;
use crate::domain::value_objects::exit_report::ExitReport;
use crate::error::{Result, SchedulerError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutput {
    pub schedule: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(rename = "machineSequences")]
    pub machine_sequences: BTreeMap<String, Vec<(u32, u32)>>,
}

/// Per-operation start times plus each machine's committed operation order,
/// read off `solution`'s cached ASAPST and chosen edges.
pub fn build_schedule_output(instance: &Instance, graph: &Graph, solution: &PartialSolution) -> Result<ScheduleOutput> {
    let mut schedule: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for &job in instance.jobs_in_id_order() {
        let mut per_op = BTreeMap::new();
        for &op in instance.job_operations(job)? {
            let vid = graph.vertex_id_of(op)?;
            per_op.insert(op.operation_id.value().to_string(), solution.asapst()[vid.value() as usize]);
        }
        schedule.insert(job.value().to_string(), per_op);
    }

    let mut machine_sequences: BTreeMap<String, Vec<(u32, u32)>> = BTreeMap::new();
    for (&machine, edges) in solution.chosen_edges_per_machine() {
        let mut ops = Vec::with_capacity(edges.len());
        for edge in edges {
            if graph.is_visible(edge.dst)? {
                if let Some(op) = graph.vertex(edge.dst)?.operation() {
                    ops.push((op.job_id.value(), op.operation_id.value()));
                }
            }
        }
        machine_sequences.insert(machine.value().to_string(), ops);
    }

    Ok(ScheduleOutput { schedule, machine_sequences })
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::ParseError(format!("failed to write {}: {e}", path.display()))
}

pub struct ScheduleWriter;

impl ScheduleWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_json<P: AsRef<Path>>(&self, instance: &Instance, graph: &Graph, solution: &PartialSolution, path: P) -> Result<()> {
        let output = build_schedule_output(instance, graph, solution)?;
        let json = serde_json::to_string_pretty(&output).map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        let mut file = File::create(path.as_ref()).map_err(|e| io_err(path.as_ref(), e))?;
        file.write_all(json.as_bytes()).map_err(|e| io_err(path.as_ref(), e))
    }

    pub fn write_cbor<P: AsRef<Path>>(&self, instance: &Instance, graph: &Graph, solution: &PartialSolution, path: P) -> Result<()> {
        let output = build_schedule_output(instance, graph, solution)?;
        let file = File::create(path.as_ref()).map_err(|e| io_err(path.as_ref(), e))?;
        ciborium::ser::into_writer(&output, file).map_err(|e| io_err(path.as_ref(), e))
    }

    /// One row per job, tab-separated, one column per that job's operations
    /// in intra-job order.
    pub fn write_text<P: AsRef<Path>>(&self, instance: &Instance, graph: &Graph, solution: &PartialSolution, path: P) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_ref())
            .map_err(|e| io_err(path.as_ref(), e))?;

        for &job in instance.jobs_in_id_order() {
            let mut row = vec![job.value().to_string()];
            for &op in instance.job_operations(job)? {
                let vid = graph.vertex_id_of(op)?;
                row.push(solution.asapst()[vid.value() as usize].to_string());
            }
            writer.write_record(&row).map_err(|e| io_err(path.as_ref(), e))?;
        }
        writer.flush().map_err(|e| io_err(path.as_ref(), e))
    }

    pub fn write_exit_report<P: AsRef<Path>>(&self, report: &ExitReport, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(report).map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        fs::write(path.as_ref(), json).map_err(|e| io_err(path.as_ref(), e))
    }
}

impl Default for ScheduleWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::forward_heuristic;
    use crate::domain::entities::ids::{JobId, MachineId, OperationId};
    use crate::domain::entities::instance::{PairTable, ShopType};
    use crate::domain::entities::operation::Operation;
    use crate::domain::value_objects::solver_config::SolverConfig;
    use std::collections::HashMap;

    fn op(j: u32, o: u32) -> Operation {
        Operation::new(JobId(j), OperationId(o))
    }

    fn two_job_flow_shop() -> Instance {
        let mut jobs = HashMap::new();
        jobs.insert(JobId(0), vec![op(0, 0), op(0, 1)]);
        jobs.insert(JobId(1), vec![op(1, 0), op(1, 1)]);
        let mut machine_of = HashMap::new();
        machine_of.insert(op(0, 0), MachineId(0));
        machine_of.insert(op(0, 1), MachineId(1));
        machine_of.insert(op(1, 0), MachineId(0));
        machine_of.insert(op(1, 1), MachineId(1));
        let mut processing_times = HashMap::new();
        processing_times.insert(op(0, 0), 10);
        processing_times.insert(op(0, 1), 20);
        processing_times.insert(op(1, 0), 15);
        processing_times.insert(op(1, 1), 25);

        Instance::new(
            "sched".to_string(),
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
    fn schedule_output_lists_every_job_and_operation() {
        let instance = two_job_flow_shop();
        let (solution, graph) = forward_heuristic::solve(&instance, &SolverConfig::default()).unwrap();
        let output = build_schedule_output(&instance, &graph, &solution).unwrap();

        assert_eq!(output.schedule.len(), 2);
        assert_eq!(output.schedule["0"].len(), 2);
        assert!(output.machine_sequences.contains_key("0"));
        assert!(output.machine_sequences.contains_key("1"));
    }
}
