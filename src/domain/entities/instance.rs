//! The declarative problem description: jobs, their operations, the machine
//! each operation runs on, processing/setup/due-date tables, and shop-type
//! metadata (fixed order vs. flow shop vs. job shop, plexity per job).

use super::ids::{JobId, MachineId, OperationId, ReEntrantId};
use super::operation::Operation;
use super::plexity::Plexity;
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopType {
    FixedOrder,
    FlowShop,
    JobShop,
}

/// A two-key lookup table over operation pairs, with a fallback default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairTable {
    default: i64,
    entries: HashMap<(Operation, Operation), i64>,
}

impl PairTable {
    pub fn new(default: i64) -> Self {
        PairTable {
            default,
            entries: HashMap::new(),
        }
    }

    pub fn set(&mut self, from: Operation, to: Operation, value: i64) {
        self.entries.insert((from, to), value);
    }

    pub fn get(&self, from: Operation, to: Operation) -> i64 {
        self.entries.get(&(from, to)).copied().unwrap_or(self.default)
    }

    pub fn get_explicit(&self, from: Operation, to: Operation) -> Option<i64> {
        self.entries.get(&(from, to)).copied()
    }

    pub fn default_value(&self) -> i64 {
        self.default
    }

    /// Every explicitly-set `(from, to) -> value` entry, in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = (Operation, Operation, i64)> + '_ {
        self.entries.iter().map(|(&(from, to), &v)| (from, to, v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    problem_name: String,

    /// Per job, its operations in intra-job precedence order.
    jobs: HashMap<JobId, Vec<Operation>>,
    jobs_in_id_order: Vec<JobId>,

    machine_of: HashMap<Operation, MachineId>,
    machines: Vec<MachineId>,

    /// Operations mapped onto each machine, in flow-vector order. More than
    /// one entry means the machine is re-entrant.
    operations_on_machine: HashMap<MachineId, Vec<Operation>>,

    processing_times: HashMap<Operation, i64>,
    default_processing_time: i64,

    setup_times: PairTable,
    setup_times_independent: PairTable,
    due_dates: PairTable,
    due_dates_independent: PairTable,

    absolute_due_dates: HashMap<JobId, i64>,

    shop_type: ShopType,
    /// Mandatory output order for `FixedOrder` shops; tie-break order
    /// otherwise.
    jobs_output_order: Vec<JobId>,
    job_to_output_position: HashMap<JobId, usize>,

    /// Plexity per `(job, re-entrancy index)`; absent entries default to
    /// `Simplex`.
    job_plexity: HashMap<(JobId, ReEntrantId), Plexity>,
}

impl Instance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        problem_name: String,
        jobs: HashMap<JobId, Vec<Operation>>,
        machine_of: HashMap<Operation, MachineId>,
        processing_times: HashMap<Operation, i64>,
        default_processing_time: i64,
        setup_times: PairTable,
        setup_times_independent: PairTable,
        due_dates: PairTable,
        due_dates_independent: PairTable,
        absolute_due_dates: HashMap<JobId, i64>,
        shop_type: ShopType,
        jobs_output_order: Vec<JobId>,
        job_plexity: HashMap<(JobId, ReEntrantId), Plexity>,
    ) -> Result<Self> {
        let mut jobs_in_id_order: Vec<JobId> = jobs.keys().copied().collect();
        jobs_in_id_order.sort();

        let mut machines: Vec<MachineId> = machine_of.values().copied().collect();
        machines.sort();
        machines.dedup();

        let mut operations_on_machine: HashMap<MachineId, Vec<Operation>> = HashMap::new();
        for jid in &jobs_in_id_order {
            for op in &jobs[jid] {
                let m = *machine_of
                    .get(op)
                    .ok_or(SchedulerError::UnknownOperation(*op))?;
                operations_on_machine.entry(m).or_default().push(*op);
            }
        }

        let job_to_output_position: HashMap<JobId, usize> = jobs_output_order
            .iter()
            .enumerate()
            .map(|(pos, jid)| (*jid, pos))
            .collect();

        let instance = Instance {
            problem_name,
            jobs,
            jobs_in_id_order,
            machine_of,
            machines,
            operations_on_machine,
            processing_times,
            default_processing_time,
            setup_times,
            setup_times_independent,
            due_dates,
            due_dates_independent,
            absolute_due_dates,
            shop_type,
            jobs_output_order,
            job_to_output_position,
            job_plexity,
        };
        instance.validate()?;
        Ok(instance)
    }

    fn validate(&self) -> Result<()> {
        for (jid, ops) in &self.jobs {
            for op in ops {
                if op.job_id != *jid {
                    return Err(SchedulerError::InconsistentInput(format!(
                        "operation {op} listed under job {jid} but carries job id {}",
                        op.job_id
                    )));
                }
                if !self.machine_of.contains_key(op) {
                    return Err(SchedulerError::UnknownOperation(*op));
                }
            }
        }
        if self.shop_type == ShopType::FixedOrder
            && self.jobs_output_order.len() != self.jobs.len()
        {
            return Err(SchedulerError::InconsistentInput(
                "fixed-order shop must declare an output position for every job".to_string(),
            ));
        }
        Ok(())
    }

    pub fn problem_name(&self) -> &str {
        &self.problem_name
    }

    pub fn jobs(&self) -> &HashMap<JobId, Vec<Operation>> {
        &self.jobs
    }

    pub fn jobs_in_id_order(&self) -> &[JobId] {
        &self.jobs_in_id_order
    }

    pub fn job_operations(&self, job: JobId) -> Result<&[Operation]> {
        self.jobs
            .get(&job)
            .map(|v| v.as_slice())
            .ok_or(SchedulerError::UnknownJob(job))
    }

    pub fn machine(&self, op: Operation) -> Result<MachineId> {
        self.machine_of
            .get(&op)
            .copied()
            .ok_or(SchedulerError::UnknownOperation(op))
    }

    pub fn is_valid_operation(&self, op: Operation) -> bool {
        self.machine_of.contains_key(&op)
    }

    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }

    pub fn total_ops(&self) -> usize {
        self.machine_of.len()
    }

    pub fn machine_operations(&self, machine: MachineId) -> &[Operation] {
        self.operations_on_machine
            .get(&machine)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// True iff some job visits `machine` more than once — a shared
    /// non-reentrant machine (the common case in a flow shop) still has
    /// many operations mapped to it, one per job, so the count alone does
    /// not distinguish the two.
    pub fn is_re_entrant(&self, machine: MachineId) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.machine_operations(machine)
            .iter()
            .any(|op| !seen.insert(op.job_id))
    }

    pub fn processing_time(&self, op: Operation) -> i64 {
        self.processing_times
            .get(&op)
            .copied()
            .unwrap_or(self.default_processing_time)
    }

    pub fn setup_time(&self, from: Operation, to: Operation) -> i64 {
        self.setup_times.get(from, to)
    }

    pub fn setup_time_independent(&self, from: Operation, to: Operation) -> i64 {
        self.setup_times_independent.get(from, to)
    }

    pub fn due_date(&self, from: Operation, to: Operation) -> Option<i64> {
        self.due_dates.get_explicit(from, to)
    }

    pub fn due_date_independent(&self, from: Operation, to: Operation) -> Option<i64> {
        self.due_dates_independent.get_explicit(from, to)
    }

    pub fn due_dates(&self) -> &PairTable {
        &self.due_dates
    }

    pub fn due_dates_independent(&self) -> &PairTable {
        &self.due_dates_independent
    }

    pub fn absolute_due_date(&self, job: JobId) -> Option<i64> {
        self.absolute_due_dates.get(&job).copied()
    }

    pub fn shop_type(&self) -> ShopType {
        self.shop_type
    }

    pub fn jobs_output_order(&self) -> &[JobId] {
        &self.jobs_output_order
    }

    pub fn job_output_position(&self, job: JobId) -> Result<usize> {
        self.job_to_output_position
            .get(&job)
            .copied()
            .ok_or(SchedulerError::UnknownJob(job))
    }

    pub fn job_at_output_position(&self, position: usize) -> Option<JobId> {
        self.jobs_output_order.get(position).copied()
    }

    pub fn plexity(&self, job: JobId, reentrancy: ReEntrantId) -> Plexity {
        self.job_plexity
            .get(&(job, reentrancy))
            .copied()
            .unwrap_or(Plexity::Simplex)
    }

    pub fn plexity_of_op(&self, op: Operation) -> Plexity {
        self.plexity(op.job_id, ReEntrantId(0))
    }

    pub fn number_of_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn re_entrant_machines(&self) -> Vec<MachineId> {
        self.machines
            .iter()
            .copied()
            .filter(|m| self.is_re_entrant(*m))
            .collect()
    }
}
