//! Reads and writes the JSON sequence-file format: an externally supplied
//! per-machine operation order, used to reproduce or seed a schedule without
//! running a search.
//!
//! Grounded on the shape the teacher's `JsonGenerator` writes for its own
//! analysis output — a handful of named top-level objects walked with
//! `serde_json::Value` rather than a single rigid `Deserialize` struct, since
//! the `machineSequences` entries are polymorphic (a flat list, or one list
//! per re-entrant iteration) in a way `serde`'s derive macros don't express
//! cleanly.

use crate::domain::entities::ids::{JobId, MachineId, ModuleId, OperationId};
use crate::domain::entities::operation::Operation;
use crate::error::{Result, SchedulerError};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A single machine's declared order, either a flat list or one list per
/// re-entrant-iteration, selected modulo the number of iterations given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineSequenceSpec {
    Flat(Vec<Operation>),
    ByIteration(Vec<Vec<Operation>>),
}

impl MachineSequenceSpec {
    pub fn resolve(&self, iteration: usize) -> Vec<Operation> {
        match self {
            MachineSequenceSpec::Flat(ops) => ops.clone(),
            MachineSequenceSpec::ByIteration(variants) if variants.is_empty() => Vec::new(),
            MachineSequenceSpec::ByIteration(variants) => variants[iteration % variants.len()].clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceFile {
    pub machine_sequences: HashMap<MachineId, MachineSequenceSpec>,
    pub modules: HashMap<ModuleId, HashMap<MachineId, MachineSequenceSpec>>,
}

impl SequenceFile {
    pub fn resolve(&self, iteration: usize) -> HashMap<MachineId, Vec<Operation>> {
        self.machine_sequences.iter().map(|(m, spec)| (*m, spec.resolve(iteration))).collect()
    }

    pub fn resolve_module(&self, module: ModuleId, iteration: usize) -> Option<HashMap<MachineId, Vec<Operation>>> {
        self.modules
            .get(&module)
            .map(|per_machine| per_machine.iter().map(|(m, spec)| (*m, spec.resolve(iteration))).collect())
    }
}

pub fn load_sequence<P: AsRef<Path>>(path: P) -> Result<SequenceFile> {
    let content = fs::read_to_string(path.as_ref())
        .map_err(|e| SchedulerError::ParseError(format!("failed to read {}: {e}", path.as_ref().display())))?;
    parse_sequence(&content)
}

pub fn parse_sequence(json: &str) -> Result<SequenceFile> {
    let root: Value = serde_json::from_str(json).map_err(|e| SchedulerError::ParseError(e.to_string()))?;

    if let Some(modules_val) = root.get("modules") {
        let modules_obj = modules_val
            .as_object()
            .ok_or_else(|| SchedulerError::ParseError("'modules' must be a JSON object".into()))?;
        let mut modules = HashMap::new();
        for (module_key, module_val) in modules_obj {
            let module_id: ModuleId = parse_id(module_key)?;
            let node = extract_machine_sequences_node(module_val)?;
            modules.insert(module_id, parse_machine_sequences(node)?);
        }
        return Ok(SequenceFile { machine_sequences: HashMap::new(), modules });
    }

    let node = extract_machine_sequences_node(&root)?;
    Ok(SequenceFile { machine_sequences: parse_machine_sequences(node)?, modules: HashMap::new() })
}

pub fn save_sequence<P: AsRef<Path>>(path: P, file: &SequenceFile) -> Result<()> {
    let json = to_json(file)?;
    fs::write(path.as_ref(), json)
        .map_err(|e| SchedulerError::ParseError(format!("failed to write {}: {e}", path.as_ref().display())))
}

pub fn sequence_to_json(file: &SequenceFile) -> Result<String> {
    to_json(file)
}

fn extract_machine_sequences_node(value: &Value) -> Result<&Value> {
    if let Some(ms) = value.get("machineSequences") {
        return Ok(ms);
    }
    if let Some(seq) = value.get("sequence") {
        if let Some(ms) = seq.get("machineSequences") {
            return Ok(ms);
        }
    }
    Err(SchedulerError::ParseError("expected a 'machineSequences' node".into()))
}

fn parse_id<T: From<u32>>(raw: &str) -> Result<T> {
    raw.parse::<u32>().map(T::from).map_err(|_| SchedulerError::ParseError(format!("invalid numeric id '{raw}'")))
}

fn op_from_pair(pair: (u32, u32)) -> Operation {
    Operation::new(JobId::new(pair.0), OperationId::new(pair.1))
}

fn parse_machine_sequences(node: &Value) -> Result<HashMap<MachineId, MachineSequenceSpec>> {
    let obj = node
        .as_object()
        .ok_or_else(|| SchedulerError::ParseError("machineSequences must be a JSON object".into()))?;

    let mut result = HashMap::new();
    for (machine_key, entry) in obj {
        let machine_id: MachineId = parse_id(machine_key)?;
        let spec = if entry.is_array() {
            let pairs: Vec<(u32, u32)> = serde_json::from_value(entry.clone())
                .map_err(|e| SchedulerError::ParseError(format!("machine {machine_key} sequence: {e}")))?;
            MachineSequenceSpec::Flat(pairs.into_iter().map(op_from_pair).collect())
        } else if entry.is_object() {
            let raw: HashMap<String, Vec<(u32, u32)>> = serde_json::from_value(entry.clone())
                .map_err(|e| SchedulerError::ParseError(format!("machine {machine_key} sequence: {e}")))?;
            let mut iterations: Vec<(u32, Vec<Operation>)> = raw
                .into_iter()
                .map(|(k, v)| {
                    let iteration: u32 = k
                        .parse()
                        .map_err(|_| SchedulerError::ParseError(format!("invalid iteration id '{k}'")))?;
                    Ok((iteration, v.into_iter().map(op_from_pair).collect()))
                })
                .collect::<Result<_>>()?;
            iterations.sort_by_key(|(k, _)| *k);
            MachineSequenceSpec::ByIteration(iterations.into_iter().map(|(_, ops)| ops).collect())
        } else {
            return Err(SchedulerError::ParseError(format!(
                "machine {machine_key} sequence must be a JSON array or object"
            )));
        };
        result.insert(machine_id, spec);
    }
    Ok(result)
}

fn pair_value(op: Operation) -> Value {
    Value::Array(vec![Value::from(op.job_id.value()), Value::from(op.operation_id.value())])
}

fn spec_to_value(spec: &MachineSequenceSpec) -> Value {
    match spec {
        MachineSequenceSpec::Flat(ops) => Value::Array(ops.iter().copied().map(pair_value).collect()),
        MachineSequenceSpec::ByIteration(variants) => {
            let mut obj = serde_json::Map::new();
            for (i, ops) in variants.iter().enumerate() {
                obj.insert(i.to_string(), Value::Array(ops.iter().copied().map(pair_value).collect()));
            }
            Value::Object(obj)
        }
    }
}

fn machine_sequences_to_value(map: &HashMap<MachineId, MachineSequenceSpec>) -> Value {
    let mut obj = serde_json::Map::new();
    for (machine, spec) in map {
        obj.insert(machine.value().to_string(), spec_to_value(spec));
    }
    Value::Object(obj)
}

fn to_json(file: &SequenceFile) -> Result<String> {
    let mut root = serde_json::Map::new();
    root.insert("machineSequences".into(), machine_sequences_to_value(&file.machine_sequences));

    if !file.modules.is_empty() {
        let mut modules = serde_json::Map::new();
        for (module, per_machine) in &file.modules {
            let mut module_obj = serde_json::Map::new();
            module_obj.insert("machineSequences".into(), machine_sequences_to_value(per_machine));
            modules.insert(module.value().to_string(), Value::Object(module_obj));
        }
        root.insert("modules".into(), Value::Object(modules));
    }

    serde_json::to_string_pretty(&Value::Object(root)).map_err(|e| SchedulerError::ParseError(e.to_string()))
}
