//! Wires a parsed [`Cli`] invocation to the application-layer use cases and
//! renders the result through `infrastructure::output`.

use std::fs;
use std::path::Path;
use std::time::Instant;

use super::{Commands, FormatArg, StrategyArg};
use crate::application::services::graph_builder::{build_fixed_sequence, build_from_machine_sequences};
use crate::application::services::longest_path::{compute_asap, initialize_asap};
use crate::application::use_cases::decision_diagram::search as dd_search;
use crate::application::use_cases::forward_heuristic;
use crate::application::use_cases::modular::{solve as solve_modular, Module, ModularConfig, ModularStrategy, ProductionLine};
use crate::domain::entities::graph::Graph;
use crate::domain::entities::instance::Instance;
use crate::domain::entities::option::IdGenerator;
use crate::domain::entities::partial_solution::PartialSolution;
use crate::domain::value_objects::exit_report::ExitReport;
use crate::domain::value_objects::solver_config::SolverConfig;
use crate::error::{Result, SchedulerError};
use crate::infrastructure::output::{GraphExporter, ScheduleWriter};
use crate::infrastructure::parsers::{load_sequence, InstanceXmlParser};
use anyhow::Context;

fn makespan_report(instance: &Instance, graph: &Graph, solution: &PartialSolution, iterations: u64, elapsed: f64) -> Result<ExitReport> {
    let makespan = solution.real_makespan(instance, graph)?;
    let total_processing: i64 = instance
        .jobs_in_id_order()
        .iter()
        .flat_map(|&j| instance.job_operations(j).into_iter().flatten())
        .map(|&op| instance.processing_time(op))
        .sum();
    let productivity = if makespan > 0 {
        total_processing as f64 / (makespan as f64 * instance.machines().len().max(1) as f64)
    } else {
        0.0
    };
    let flexibility = if makespan > 0 {
        1.0 - (solution.makespan_last_scheduled_job().max(0) as f64 / makespan as f64)
    } else {
        0.0
    };
    Ok(ExitReport::optimal(makespan, productivity.clamp(0.0, 1.0), flexibility.clamp(0.0, 1.0), iterations, elapsed))
}

/// Solves a single instance according to `sequence`/`policy`, returning the
/// graph it was validated against alongside the committed solution.
fn solve_single(instance: &Instance, config: &SolverConfig, sequence: Option<&Path>) -> Result<(Graph, PartialSolution, ExitReport)> {
    let started = Instant::now();

    if let Some(path) = sequence {
        let file = load_sequence(path)?;
        let resolved = file.resolve(0);
        let (graph, chosen_edges) = build_from_machine_sequences(instance, &resolved)?;
        let mut id_gen = IdGenerator::new();
        let mut asapst = initialize_asap(&graph, &[], true)?;
        let cycle = compute_asap(&graph, &mut asapst);
        if !cycle.is_empty() {
            return Err(SchedulerError::PositiveCycleDetected(
                cycle.into_iter().map(|e| (e.src, e.dst, e.weight)).collect(),
            ));
        }
        let solution = PartialSolution::new(chosen_edges, asapst, &mut id_gen);
        let report = makespan_report(instance, &graph, &solution, 0, started.elapsed().as_secs_f64())?;
        return Ok((graph, solution, report));
    }

    match config.policy {
        crate::domain::value_objects::solver_config::SearchPolicy::Forward => {
            let (solution, graph) = forward_heuristic::solve(instance, config)?;
            let report = makespan_report(instance, &graph, &solution, 1, started.elapsed().as_secs_f64())?;
            Ok((graph, solution, report))
        }
        crate::domain::value_objects::solver_config::SearchPolicy::DecisionDiagram => {
            let (dd, best) = dd_search::solve(instance, config, None)?;
            let elapsed = started.elapsed().as_secs_f64();
            let Some(vertex) = best else {
                return Err(SchedulerError::NoSolution);
            };
            let graph = build_fixed_sequence(instance, vertex.job_order())?;
            let mut id_gen = IdGenerator::new();
            let solution = PartialSolution::new(vertex.machine_edges().clone(), vertex.asapst().clone(), &mut id_gen);
            let makespan = solution.real_makespan(instance, &graph)?;
            let report = if dd.is_optimal() {
                makespan_report(instance, &graph, &solution, 1, elapsed)?
            } else {
                ExitReport::time_out(Some(makespan), 1, elapsed)
            };
            Ok((graph, solution, report))
        }
    }
}

fn write_outputs(instance: &Instance, graph: &Graph, solution: &PartialSolution, report: &ExitReport, output_dir: &Path, format: &FormatArg) -> Result<()> {
    fs::create_dir_all(output_dir)
        .map_err(|e| SchedulerError::ParseError(format!("failed to create {}: {e}", output_dir.display())))?;

    let writer = ScheduleWriter::new();
    if format.wants_json() {
        writer.write_json(instance, graph, solution, output_dir.join("schedule.json"))?;
    }
    if format.wants_cbor() {
        writer.write_cbor(instance, graph, solution, output_dir.join("schedule.cbor"))?;
    }
    if format.wants_text() {
        writer.write_text(instance, graph, solution, output_dir.join("schedule.txt"))?;
    }
    writer.write_exit_report(report, output_dir.join("exit_report.json"))?;

    if format.wants_dot() || format.wants_tikz() {
        let exporter = GraphExporter::new()?;
        if format.wants_dot() {
            exporter.write_dot(graph, output_dir.join("graph.dot"))?;
        }
        if format.wants_tikz() {
            exporter.write_tikz(graph, output_dir.join("graph.tikz"))?;
        }
    }
    Ok(())
}

pub fn run(cli: &Commands) -> anyhow::Result<()> {
    match cli {
        Commands::Solve { input, sequence, output_dir, format, .. } => {
            let instance = InstanceXmlParser::new()
                .parse_file(input)
                .with_context(|| format!("parsing instance {}", input.display()))?;
            let config = cli.solver_config();
            let (graph, solution, report) = solve_single(&instance, &config, sequence.as_deref())?;
            write_outputs(&instance, &graph, &solution, &report, output_dir, format)?;
            tracing::info!(makespan = ?report.makespan, solved = report.solved, "solve finished");
            Ok(())
        }
        Commands::SolveModular { input, strategy, max_rounds, output_dir, format } => {
            let line = load_production_line(input)?;
            let modular_config = ModularConfig {
                strategy: match strategy {
                    StrategyArg::Broadcast => ModularStrategy::Broadcast,
                    StrategyArg::Cocktail => ModularStrategy::Cocktail,
                },
                max_rounds: *max_rounds,
                epsilon: 0,
            };
            let solver_config = SolverConfig::default();
            let solution = solve_modular(&line, &solver_config, &modular_config)?;

            fs::create_dir_all(output_dir)
                .map_err(|e| SchedulerError::ParseError(format!("failed to create {}: {e}", output_dir.display())))?;

            for module in &line.modules {
                let Some((module_solution, module_graph)) = solution.per_module.get(&module.id) else {
                    continue;
                };
                let makespan = module_solution.real_makespan(&module.instance, module_graph)?;
                let report = ExitReport::optimal(makespan, 0.0, 0.0, solution.rounds_run as u64, 0.0);
                let module_dir = output_dir.join(format!("module_{}", module.id));
                write_outputs(&module.instance, module_graph, module_solution, &report, &module_dir, format)?;
            }
            tracing::info!(rounds = solution.rounds_run, converged = solution.converged, "modular solve finished");
            Ok(())
        }
    }
}

/// Loads a production line either from a single `MODULAR` `SPInstance`
/// document, or from a directory of per-module `FORPFSSPSD` files (module
/// id taken from each file's sort position, transfers assumed direct with
/// zero transfer time — there is no separate transfer document in that
/// layout).
fn load_production_line(path: &Path) -> Result<ProductionLine> {
    if path.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(path)
            .map_err(|e| SchedulerError::ParseError(format!("failed to read {}: {e}", path.display())))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
            .collect();
        entries.sort();

        let mut modules = Vec::with_capacity(entries.len());
        for (idx, file) in entries.iter().enumerate() {
            let instance = InstanceXmlParser::new().parse_file(file)?;
            modules.push(Module { id: crate::domain::entities::ids::ModuleId::new(idx as u32), instance });
        }
        let transfers = modules
            .windows(2)
            .map(|w| crate::application::use_cases::modular::Transfer {
                from: w[0].id,
                to: w[1].id,
                transfer_time: 0,
                due_date: None,
            })
            .collect();
        Ok(ProductionLine { modules, transfers })
    } else {
        InstanceXmlParser::new().parse_modular_file(path)
    }
}
