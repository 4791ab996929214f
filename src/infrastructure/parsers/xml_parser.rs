//! Parses the `SPInstance` XML instance format into domain entities.
//!
//! Grounded on `original_source/FORPFSSPSD/xmlParser.cpp`'s
//! `SingleFlowShopParser`/`FORPFSSPSDXmlParser`, retargeted from
//! `rapidxml` to `roxmltree` the way the teacher's own XML parser reads a
//! document once and walks it with borrowed `Node`s. The two-sided
//! v1/v2 flow-vector dance, the setup/due-date dependent-vs-independent
//! split, and the modular `transfers` block are carried over; the
//! original's per-reentrant-machine `ReEntrancies` vector collapses into
//! this crate's single `Plexity` per job (`Instance::plexity_of_op` only
//! ever consults `ReEntrantId(0)`), and the standalone maintenance-policy
//! XML file is dropped in favor of `SolverConfig`'s single interval and
//! duration (see `application/use_cases/maintenance.rs`).

use crate::application::use_cases::modular::{Module, ProductionLine, Transfer};
use crate::domain::entities::ids::{JobId, MachineId, ModuleId, OperationId, ReEntrantId};
use crate::domain::entities::instance::{Instance, PairTable, ShopType};
use crate::domain::entities::operation::Operation;
use crate::domain::entities::plexity::Plexity;
use crate::error::{Result, SchedulerError};
use encoding_rs::WINDOWS_1252;
use encoding_rs_io::DecodeReaderBytesBuilder;
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Reads an instance file, auto-detecting a BOM-declared encoding and
/// otherwise falling back to Windows-1252 — the encoding the original
/// tool's older exports carry with no BOM of their own.
fn read_instance_file(path: &Path) -> Result<String> {
    let file =
        fs::File::open(path).map_err(|e| SchedulerError::ParseError(format!("failed to read {}: {e}", path.display())))?;
    let mut decoder = DecodeReaderBytesBuilder::new().encoding(Some(WINDOWS_1252)).build(file);
    let mut content = String::new();
    decoder
        .read_to_string(&mut content)
        .map_err(|e| SchedulerError::ParseError(format!("failed to read {}: {e}", path.display())))?;
    Ok(content)
}

pub struct InstanceXmlParser;

impl InstanceXmlParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Instance> {
        let content = read_instance_file(path.as_ref())?;
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("instance")
            .to_string();
        self.parse(&content, name)
    }

    pub fn parse(&self, xml: &str, problem_name: String) -> Result<Instance> {
        let doc = Document::parse(xml).map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        let root = root_element(&doc, "SPInstance")?;
        expect_type(root, "FORPFSSPSD")?;
        extract_instance(root, problem_name)
    }

    pub fn parse_modular_file<P: AsRef<Path>>(&self, path: P) -> Result<ProductionLine> {
        let content = read_instance_file(path.as_ref())?;
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("production-line")
            .to_string();
        self.parse_modular(&content, name)
    }

    pub fn parse_modular(&self, xml: &str, problem_name: String) -> Result<ProductionLine> {
        let doc = Document::parse(xml).map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        let root = root_element(&doc, "SPInstance")?;
        expect_type(root, "MODULAR")?;

        let mut modules = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("SPInstance")) {
            let id = ModuleId::new(int_attr(node, "id")? as u32);
            let instance = extract_instance(node, format!("{problem_name}-{}", id.value()))?;
            modules.push(Module { id, instance });
        }
        if modules.is_empty() {
            return Err(SchedulerError::ParseError("modular instance declares no SPInstance modules".into()));
        }

        let transfers_node = required_child(root, "transfers")?;
        let mut transfers = Vec::new();
        for node in transfers_node.children().filter(|n| n.has_tag_name("modulesTransfer")) {
            let from = ModuleId::new(int_attr(node, "id_from")? as u32);
            let to = ModuleId::new(int_attr(node, "id_to")? as u32);
            if from.value() + 1 != to.value() {
                return Err(SchedulerError::ParseError(
                    "ids of transfers between modules must be consecutive".into(),
                ));
            }
            let from_module = modules
                .iter()
                .find(|m| m.id == from)
                .ok_or_else(|| SchedulerError::ParseError(format!("transfer points: module {from} does not exist")))?;

            let setup_node = required_child(node, "setupTimes")?;
            let transfer_time = optional_int_attr(setup_node, "default").unwrap_or(0);

            let due_node = required_child(node, "relativeDueDates")?;
            let due_dates = load_job_timings(due_node, "d", &from_module.instance)?;
            // The original folds the upstream operation's own processing time
            // into its transfer due date so the stored value is an absolute
            // offset from the upstream completion time, not its start time.
            let due_date = due_dates.values().copied().max();

            transfers.push(Transfer { from, to, transfer_time, due_date });
        }

        Ok(ProductionLine { modules, transfers })
    }
}

impl Default for InstanceXmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn root_element<'a, 'input>(doc: &'a Document<'input>, expected: &str) -> Result<Node<'a, 'input>> {
    let root = doc.root_element();
    if !root.has_tag_name(expected) {
        return Err(SchedulerError::ParseError(format!("expected a '{expected}' root element")));
    }
    Ok(root)
}

fn expect_type(node: Node, expected: &str) -> Result<()> {
    let ty = required_attr(node, "type")?;
    if !ty.eq_ignore_ascii_case(expected) {
        return Err(SchedulerError::ParseError(format!("unexpected SPInstance type '{ty}', expected '{expected}'")));
    }
    Ok(())
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| SchedulerError::ParseError(format!("expected a '{name}' attribute on <{}>", node.tag_name().name())))
}

fn int_attr(node: Node, name: &str) -> Result<i64> {
    let raw = required_attr(node, name)?;
    raw.parse::<i64>()
        .map_err(|_| SchedulerError::ParseError(format!("attribute '{name}' is not an integer: '{raw}'")))
}

fn optional_int_attr(node: Node, name: &str) -> Option<i64> {
    node.attribute(name).and_then(|v| v.parse::<i64>().ok())
}

fn required_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| SchedulerError::ParseError(format!("expected a '{name}' node")))
}

fn op(job: i64, operation: i64) -> Operation {
    Operation::new(JobId::new(job as u32), OperationId::new(operation as u32))
}

fn extract_instance(root: Node, problem_name: String) -> Result<Instance> {
    let jobs_node = required_child(root, "jobs")?;
    let number_of_jobs = int_attr(jobs_node, "count")?;

    let flow_vector_node = required_child(root, "flowVector")?;
    let (jobs, machine_of) = load_flow_vector(root, flow_vector_node, number_of_jobs)?;

    let known_ops: HashSet<Operation> = machine_of.keys().copied().collect();

    let processing_node = required_child(root, "processingTimes")?;
    let (processing_times, default_processing_time) = load_processing_times(processing_node)?;

    let (setup_times, setup_times_independent) = load_setup_times(root, &machine_of, &known_ops)?;
    let (due_dates, due_dates_independent, absolute_due_dates) = load_due_dates(root, &machine_of, &known_ops)?;

    let job_plexity = root
        .children()
        .find(|n| n.has_tag_name("jobPlexity"))
        .map(load_job_plexity)
        .transpose()?
        .unwrap_or_default();

    Instance::new(
        problem_name,
        jobs,
        machine_of,
        processing_times,
        default_processing_time,
        setup_times,
        setup_times_independent,
        due_dates,
        due_dates_independent,
        absolute_due_dates,
        ShopType::FlowShop,
        (0..number_of_jobs).map(|j| JobId::new(j as u32)).collect(),
        job_plexity,
    )
}

type FlowVectorResult = (HashMap<JobId, Vec<Operation>>, HashMap<Operation, MachineId>);

fn load_flow_vector(root: Node, fv_node: Node, number_of_jobs: i64) -> Result<FlowVectorResult> {
    let first_child = fv_node
        .children()
        .find(|n| n.is_element())
        .ok_or_else(|| SchedulerError::ParseError("expected at least one flow vector entry".into()))?;

    if first_child.attribute("job").is_some() {
        load_flow_vector_v2(fv_node)
    } else {
        load_flow_vector_v1(root, fv_node, number_of_jobs)
    }
}

fn load_flow_vector_v2(fv_node: Node) -> Result<FlowVectorResult> {
    let mut jobs: HashMap<JobId, Vec<Operation>> = HashMap::new();
    let mut machine_of = HashMap::new();

    for child in fv_node.children().filter(|n| n.is_element()) {
        let op_id = int_attr(child, "index")?;
        let machine = MachineId::new(int_attr(child, "value")? as u32);
        let job_id = int_attr(child, "job")?;

        let operation = op(job_id, op_id);
        jobs.entry(JobId::new(job_id as u32)).or_default().push(operation);
        machine_of.insert(operation, machine);
    }
    for ops in jobs.values_mut() {
        ops.sort_by_key(|o| o.operation_id.value());
    }
    Ok((jobs, machine_of))
}

/// The jobless flow-vector form: one `(operationIndex, machine)` template
/// shared by every job, expanded per job according to which machines
/// repeat and that job's declared plexity (`ReEntrantId(0)` only, per
/// `Instance::plexity_of_op`'s simplification).
fn load_flow_vector_v1(root: Node, fv_node: Node, number_of_jobs: i64) -> Result<FlowVectorResult> {
    let mut template = Vec::new();
    let mut occurrences: HashMap<MachineId, u32> = HashMap::new();

    for child in fv_node.children().filter(|n| n.is_element()) {
        let op_id = OperationId::new(int_attr(child, "index")? as u32);
        let machine = MachineId::new(int_attr(child, "value")? as u32);
        template.push((op_id, machine));
        *occurrences.entry(machine).or_insert(0) += 1;
    }

    let job_plexity = root
        .children()
        .find(|n| n.has_tag_name("jobPlexity"))
        .map(load_job_plexity)
        .transpose()?
        .unwrap_or_default();

    let mut jobs: HashMap<JobId, Vec<Operation>> = HashMap::new();
    let mut machine_of = HashMap::new();

    for j in 0..number_of_jobs {
        let job_id = JobId::new(j as u32);
        let plexity = job_plexity.get(&(job_id, ReEntrantId(0))).copied().unwrap_or(Plexity::Duplex);
        let mut seen: HashMap<MachineId, u32> = HashMap::new();
        let mut ops = Vec::new();

        for &(op_id, machine) in &template {
            let total = *occurrences.get(&machine).unwrap_or(&1);
            let seen_so_far = *seen.entry(machine).or_insert(0);
            seen.insert(machine, seen_so_far + 1);

            if total > 1 {
                let keep = plexity.number_of_ops();
                let skip = total.saturating_sub(keep);
                if seen_so_far < skip {
                    continue;
                }
            }

            let operation = op(j, op_id.value() as i64);
            ops.push(operation);
            machine_of.insert(operation, machine);
        }
        jobs.insert(job_id, ops);
    }

    Ok((jobs, machine_of))
}

/// `type` is `"S"`/`"D"` (the original's shorthand), a spelled-out
/// `"SIMPLEX"`/`"DUPLEX"`, or a bare integer — all three appear across the
/// example instances.
fn parse_plexity_type(ty: &str) -> Result<Plexity> {
    match ty {
        "S" => Ok(Plexity::Simplex),
        "D" => Ok(Plexity::Duplex),
        other => other
            .parse()
            .map_err(|_| SchedulerError::ParseError(format!("invalid job plexity type '{other}'"))),
    }
}

fn load_job_plexity(node: Node) -> Result<HashMap<(JobId, ReEntrantId), Plexity>> {
    let mut result = HashMap::new();
    for child in node.children().filter(|n| n.is_element()) {
        let ty = required_attr(child, "type")?;
        let plexity = parse_plexity_type(ty)?;
        let job_id = JobId::new(int_attr(child, "j")? as u32);
        result.insert((job_id, ReEntrantId(0)), plexity);
    }
    Ok(result)
}

fn load_processing_times(node: Node) -> Result<(HashMap<Operation, i64>, i64)> {
    let default = int_attr(node, "default")?;
    let mut table = HashMap::new();
    for child in node.children().filter(|n| n.is_element()) {
        let job = int_attr(child, "j")?;
        let operation = int_attr(child, "op")?;
        let value = int_attr(child, "value")?;
        table.insert(op(job, operation), value);
    }
    Ok((table, default))
}

/// Raw `(op1, op2, value)` entries from a time table node, plus its
/// `default` attribute if present. Both operations must already be known.
fn load_time_table(
    node: Node,
    tag: &str,
    known_ops: &HashSet<Operation>,
) -> Result<(Vec<(Operation, Operation, i64)>, Option<i64>)> {
    let default = optional_int_attr(node, "default");
    let mut entries = Vec::new();
    for child in node.children().filter(|n| n.has_tag_name(tag)) {
        let op1 = op(int_attr(child, "j1")?, int_attr(child, "op1")?);
        let op2 = op(int_attr(child, "j2")?, int_attr(child, "op2")?);
        let value = int_attr(child, "value")?;
        if !known_ops.contains(&op1) {
            return Err(SchedulerError::UnknownOperation(op1));
        }
        if !known_ops.contains(&op2) {
            return Err(SchedulerError::UnknownOperation(op2));
        }
        entries.push((op1, op2, value));
    }
    Ok((entries, default))
}

/// True for a sequence-*dependent* pair: different jobs, same machine.
fn is_dependent(machine_of: &HashMap<Operation, MachineId>, a: Operation, b: Operation) -> bool {
    a.job_id != b.job_id && machine_of.get(&a) == machine_of.get(&b)
}

fn load_setup_times(
    root: Node,
    machine_of: &HashMap<Operation, MachineId>,
    known_ops: &HashSet<Operation>,
) -> Result<(PairTable, PairTable)> {
    let setup_node = required_child(root, "setupTimes")?;
    let (entries, default) = load_time_table(setup_node, "s", known_ops)?;
    let default = default.ok_or_else(|| SchedulerError::ParseError("setupTimes requires a 'default' attribute".into()))?;

    let mut setup_times = PairTable::new(default);
    let mut setup_times_independent = PairTable::new(0);

    if let Some(indep_node) = root.children().find(|n| n.has_tag_name("setupTimesIndependent")) {
        let (indep_entries, indep_default) = load_time_table(indep_node, "s", known_ops)?;
        setup_times_independent = PairTable::new(indep_default.unwrap_or(0));
        for (a, b, v) in indep_entries {
            setup_times_independent.set(a, b, v);
        }
    }

    for (a, b, v) in entries {
        if is_dependent(machine_of, a, b) {
            setup_times.set(a, b, v);
        } else {
            setup_times_independent.set(a, b, v);
        }
    }

    Ok((setup_times, setup_times_independent))
}

type DueDatesResult = (PairTable, PairTable, HashMap<JobId, i64>);

fn load_due_dates(
    root: Node,
    machine_of: &HashMap<Operation, MachineId>,
    known_ops: &HashSet<Operation>,
) -> Result<DueDatesResult> {
    let mut due_dates = PairTable::new(i64::MAX);
    let mut due_dates_independent = PairTable::new(i64::MAX);

    if let Some(indep_node) = root.children().find(|n| n.has_tag_name("relativeDueDatesIndependent")) {
        let (entries, default) = load_time_table(indep_node, "d", known_ops)?;
        due_dates_independent = PairTable::new(default.unwrap_or(i64::MAX));
        for (a, b, v) in entries {
            due_dates_independent.set(a, b, v);
        }
    }

    if let Some(dd_node) = root.children().find(|n| n.has_tag_name("relativeDueDates")) {
        let (entries, default) = load_time_table(dd_node, "d", known_ops)?;
        if let Some(default) = default {
            due_dates = PairTable::new(default);
        }
        for (a, b, v) in entries {
            if is_dependent(machine_of, a, b) {
                due_dates.set(a, b, v);
            } else {
                due_dates_independent.set(a, b, v);
            }
        }
    }

    let mut absolute_due_dates = HashMap::new();
    if let Some(abs_node) = root.children().find(|n| n.has_tag_name("absoluteDeadlines")) {
        for child in abs_node.children().filter(|n| n.is_element()) {
            let job_id = JobId::new(int_attr(child, "j")? as u32);
            let value = int_attr(child, "value")?;
            absolute_due_dates.insert(job_id, value);
        }
    }

    Ok((due_dates, due_dates_independent, absolute_due_dates))
}

/// Per-job `(jobId -> value)` timing table, used by the modular transfer
/// block's `relativeDueDates`. Every referenced job must exist in
/// `instance`.
fn load_job_timings(node: Node, tag: &str, instance: &Instance) -> Result<HashMap<JobId, i64>> {
    let mut result = HashMap::new();
    for child in node.children().filter(|n| n.has_tag_name(tag)) {
        let job_id = JobId::new(int_attr(child, "j")? as u32);
        let value = int_attr(child, "value")?;
        if instance.job_operations(job_id).is_err() {
            return Err(SchedulerError::UnknownJob(job_id));
        }
        let last_op = *instance.job_operations(job_id)?.last().expect("job has operations");
        result.insert(job_id, value + instance.processing_time(last_op));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_xml() -> &'static str {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SPInstance type="FORPFSSPSD">
    <jobs count="2"/>
    <flowVector>
        <component index="0" value="0"/>
        <component index="1" value="1"/>
    </flowVector>
    <processingTimes default="0">
        <p j="0" op="0" value="10"/>
        <p j="0" op="1" value="20"/>
        <p j="1" op="0" value="15"/>
        <p j="1" op="1" value="25"/>
    </processingTimes>
    <setupTimes default="0"/>
    <relativeDueDates default="2147483647"/>
</SPInstance>"#
    }

    #[test]
    fn parses_a_simple_flow_shop() {
        let parser = InstanceXmlParser::new();
        let instance = parser.parse(sample_xml(), "sample".into()).unwrap();

        assert_eq!(instance.number_of_jobs(), 2);
        assert_eq!(instance.machines().len(), 2);
        assert_eq!(instance.processing_time(op(0, 0)), 10);
        assert_eq!(instance.processing_time(op(1, 1)), 25);
    }

    #[test]
    fn rejects_a_root_with_the_wrong_type() {
        let xml = sample_xml().replace("FORPFSSPSD", "MODULAR");
        let parser = InstanceXmlParser::new();
        assert!(parser.parse(&xml, "sample".into()).is_err());
    }

    #[test]
    fn expands_the_jobless_flow_vector_against_declared_plexity() {
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
    <processingTimes default="5"/>
    <setupTimes default="0"/>
    <relativeDueDates default="2147483647"/>
</SPInstance>"#;
        let parser = InstanceXmlParser::new();
        let instance = parser.parse(xml, "sample".into()).unwrap();

        assert_eq!(instance.job_operations(JobId::new(0)).unwrap().len(), 3, "duplex job visits machine 0 twice");
        assert_eq!(instance.job_operations(JobId::new(1)).unwrap().len(), 2, "simplex job visits machine 0 once");
    }
}
