//! End-to-end scenarios over small inline fixtures: a single-job trivial
//! schedule, an all-simplex flow shop, a mixed-plexity re-entrant instance
//! round-tripped through a saved sequence file, and a two-module production
//! line under both orchestration strategies.

use std::collections::HashMap;

use jobweaver::application::services::graph_builder::build_from_machine_sequences;
use jobweaver::application::services::longest_path::{compute_asap, initialize_asap};
use jobweaver::application::use_cases::forward_heuristic;
use jobweaver::application::use_cases::modular::{solve as solve_modular, Module, ModularConfig, ModularStrategy, ProductionLine, Transfer};
use jobweaver::domain::entities::ids::{JobId, MachineId, ModuleId, OperationId};
use jobweaver::domain::entities::operation::Operation;
use jobweaver::domain::entities::option::IdGenerator;
use jobweaver::domain::entities::partial_solution::PartialSolution;
use jobweaver::domain::value_objects::solver_config::SolverConfig;
use jobweaver::infrastructure::parsers::sequence_parser::{parse_sequence, sequence_to_json, MachineSequenceSpec, SequenceFile};
use jobweaver::infrastructure::parsers::InstanceXmlParser;

fn parser() -> InstanceXmlParser {
    InstanceXmlParser::new()
}

#[test]
fn single_job_makespan_equals_sum_of_processing_times() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<SPInstance type="FORPFSSPSD">
    <jobs count="1"/>
    <flowVector>
        <component index="0" value="0"/>
        <component index="1" value="1"/>
        <component index="2" value="2"/>
    </flowVector>
    <processingTimes default="0">
        <p j="0" op="0" value="10"/>
        <p j="0" op="1" value="20"/>
        <p j="0" op="2" value="15"/>
    </processingTimes>
    <setupTimes default="0"/>
    <relativeDueDates default="2147483647"/>
</SPInstance>"#;

    let instance = parser().parse(xml, "single-job".into()).unwrap();
    let (solution, graph) = forward_heuristic::solve(&instance, &SolverConfig::default()).unwrap();

    assert_eq!(solution.real_makespan(&instance, &graph).unwrap(), 45);
}

#[test]
fn all_simplex_flow_shop_has_no_reentrant_machines() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<SPInstance type="FORPFSSPSD">
    <jobs count="2"/>
    <flowVector>
        <component index="0" value="0" job="0"/>
        <component index="1" value="1" job="0"/>
        <component index="0" value="0" job="1"/>
        <component index="1" value="1" job="1"/>
    </flowVector>
    <processingTimes default="0">
        <p j="0" op="0" value="10"/>
        <p j="0" op="1" value="20"/>
        <p j="1" op="0" value="15"/>
        <p j="1" op="1" value="25"/>
    </processingTimes>
    <setupTimes default="0"/>
    <relativeDueDates default="2147483647"/>
</SPInstance>"#;

    let instance = parser().parse(xml, "all-simplex".into()).unwrap();
    assert!(instance.re_entrant_machines().is_empty());

    let (solution, graph) = forward_heuristic::solve(&instance, &SolverConfig::default()).unwrap();
    let makespan = solution.real_makespan(&instance, &graph).unwrap();
    assert!(makespan >= 25, "must be at least as long as the slowest job's total processing time");
}

/// A duplex job re-visiting machine 0, alongside a simplex job that visits
/// it only once: the structural shape `load_flow_vector_v1`'s skip rule
/// exists for. Solved once, saved as a sequence file, reloaded, and
/// rebuilt — the reconstructed schedule must reproduce the same makespan.
fn mixed_plexity_instance() -> jobweaver::domain::entities::instance::Instance {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<SPInstance type="FORPFSSPSD">
    <jobs count="2"/>
    <flowVector>
        <component index="0" value="0"/>
        <component index="1" value="1"/>
        <component index="2" value="0"/>
    </flowVector>
    <jobPlexity>
        <p j="0" type="D"/>
        <p j="1" type="S"/>
    </jobPlexity>
    <processingTimes default="0">
        <p j="0" op="0" value="10"/>
        <p j="0" op="1" value="5"/>
        <p j="0" op="2" value="8"/>
        <p j="1" op="0" value="12"/>
        <p j="1" op="1" value="6"/>
    </processingTimes>
    <setupTimes default="0"/>
    <relativeDueDates default="2147483647"/>
</SPInstance>"#;
    parser().parse(xml, "mixed-plexity".into()).unwrap()
}

fn op(j: u32, o: u32) -> Operation {
    Operation::new(JobId::new(j), OperationId::new(o))
}

#[test]
fn mixed_plexity_sequence_round_trip_preserves_makespan() {
    let instance = mixed_plexity_instance();
    assert_eq!(instance.job_operations(JobId::new(0)).unwrap().len(), 3);
    assert_eq!(instance.job_operations(JobId::new(1)).unwrap().len(), 2);

    let (solution, graph) = forward_heuristic::solve(&instance, &SolverConfig::default()).unwrap();
    let original_makespan = solution.real_makespan(&instance, &graph).unwrap();

    let mut machine_sequences = HashMap::new();
    for (&machine, edges) in solution.chosen_edges_per_machine() {
        let mut ops = Vec::new();
        for edge in edges {
            if graph.is_visible(edge.dst).unwrap() {
                if let Some(operation) = graph.vertex(edge.dst).unwrap().operation() {
                    ops.push(operation);
                }
            }
        }
        machine_sequences.insert(machine, MachineSequenceSpec::Flat(ops));
    }
    let file = SequenceFile { machine_sequences, modules: HashMap::new() };

    let json = sequence_to_json(&file).unwrap();
    let reloaded = parse_sequence(&json).unwrap();
    let resolved = reloaded.resolve(0);

    let (rebuilt_graph, chosen_edges) = build_from_machine_sequences(&instance, &resolved).unwrap();
    let mut id_gen = IdGenerator::new();
    let mut asapst = initialize_asap(&rebuilt_graph, &[], true).unwrap();
    let cycle = compute_asap(&rebuilt_graph, &mut asapst);
    assert!(cycle.is_empty());
    let rebuilt_solution = PartialSolution::new(chosen_edges, asapst, &mut id_gen);

    let rebuilt_makespan = rebuilt_solution.real_makespan(&instance, &rebuilt_graph).unwrap();
    assert_eq!(rebuilt_makespan, original_makespan);
}

fn single_machine_module(job: u32, machine: u32, processing_time: i64) -> jobweaver::domain::entities::instance::Instance {
    use jobweaver::domain::entities::instance::{Instance, PairTable, ShopType};

    let mut jobs = HashMap::new();
    jobs.insert(JobId::new(job), vec![op(job, 0)]);
    let mut machine_of = HashMap::new();
    machine_of.insert(op(job, 0), MachineId::new(machine));
    let mut processing_times = HashMap::new();
    processing_times.insert(op(job, 0), processing_time);

    Instance::new(
        format!("module-{machine}"),
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
        vec![JobId::new(job)],
        HashMap::new(),
    )
    .unwrap()
}

fn two_module_line() -> ProductionLine {
    let upstream = single_machine_module(0, 0, 10);
    let downstream = single_machine_module(0, 1, 20);

    ProductionLine {
        modules: vec![
            Module { id: ModuleId::new(0), instance: upstream },
            Module { id: ModuleId::new(1), instance: downstream },
        ],
        transfers: vec![Transfer { from: ModuleId::new(0), to: ModuleId::new(1), transfer_time: 5, due_date: None }],
    }
}

fn downstream_start(solution: &jobweaver::application::use_cases::modular::ModularSolution) -> i64 {
    let (module_solution, module_graph) = &solution.per_module[&ModuleId::new(1)];
    let vid = module_graph.vertex_id_of(op(0, 0)).unwrap();
    module_solution.asapst()[vid.value() as usize]
}

#[test]
fn modular_broadcast_propagates_the_transfer_delay() {
    let line = two_module_line();
    let config = ModularConfig { strategy: ModularStrategy::Broadcast, max_rounds: 10, epsilon: 0 };
    let solution = solve_modular(&line, &SolverConfig::default(), &config).unwrap();

    assert!(solution.per_module.contains_key(&ModuleId::new(0)));
    assert!(solution.per_module.contains_key(&ModuleId::new(1)));
    assert!(downstream_start(&solution) >= 15, "downstream must not start before upstream completion plus transfer time");
}

#[test]
fn modular_cocktail_also_converges() {
    let line = two_module_line();
    let config = ModularConfig { strategy: ModularStrategy::Cocktail, max_rounds: 10, epsilon: 0 };
    let solution = solve_modular(&line, &SolverConfig::default(), &config).unwrap();

    assert!(downstream_start(&solution) >= 15);
}
