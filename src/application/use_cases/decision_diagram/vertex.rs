//! A single state in the decision-diagram search: a partial schedule
//! together with the bookkeeping needed to expand it further.
//!
//! Grounded on `DD/vertex.hpp`. States own their edges by value instead of
//! being linked through `shared_ptr`; the search keeps the live set in a
//! plain `Vec`/arena indexed by [`StateId`] rather than reference-counting.

use crate::application::services::longest_path::PathTimes;
use crate::domain::entities::graph::{Edge, Graph, VertexId};
use crate::domain::entities::ids::{JobId, MachineId, StateId};
use crate::domain::entities::instance::{Instance, ShopType};
use crate::domain::entities::operation::Operation;
use crate::domain::entities::partial_solution::MachineEdges;
use crate::error::Result;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct DdVertex {
    id: StateId,
    machine_edges: MachineEdges,
    asapst: PathTimes,
    alapst: PathTimes,
    /// Per job (indexed by position in the instance's output order), how
    /// many of its operations have been committed so far.
    jobs_completion: Vec<usize>,
    /// Jobs in the order their first operation was committed — the
    /// no-overtaking rule for flow shops is checked against this order.
    job_order: Vec<JobId>,
    ready_ops: HashMap<JobId, Vec<Operation>>,
    scheduled_ops: HashSet<VertexId>,
    last_operation: HashMap<MachineId, VertexId>,
    terminal: bool,
    vertex_depth: u64,
}

impl DdVertex {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: StateId,
        machine_edges: MachineEdges,
        asapst: PathTimes,
        alapst: PathTimes,
        jobs_completion: Vec<usize>,
        job_order: Vec<JobId>,
        last_operation: HashMap<MachineId, VertexId>,
        scheduled_ops: HashSet<VertexId>,
        vertex_depth: u64,
    ) -> Self {
        DdVertex {
            id,
            machine_edges,
            asapst,
            alapst,
            jobs_completion,
            job_order,
            ready_ops: HashMap::new(),
            scheduled_ops,
            last_operation,
            terminal: false,
            vertex_depth,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    /// The position-wise last ASAP entry, used as the state's lower bound on
    /// makespan (matches `PartialSolution::makespan`'s convention).
    pub fn lower_bound(&self) -> i64 {
        self.asapst.last().copied().unwrap_or(i64::MIN)
    }

    pub fn vertex_depth(&self) -> u64 {
        self.vertex_depth
    }

    pub fn ready_ops(&self) -> &HashMap<JobId, Vec<Operation>> {
        &self.ready_ops
    }

    /// The first ready operation of each ready job — what the dominance
    /// check and state expansion iterate over, since a flow-shop job's
    /// whole remaining chain is scheduled in one step but is still subject
    /// to the intra-job precedence edges of the base graph.
    pub fn immediately_ready_ops(&self) -> Vec<Operation> {
        self.ready_ops.values().filter_map(|ops| ops.first().copied()).collect()
    }

    pub fn scheduled_ops(&self) -> &HashSet<VertexId> {
        &self.scheduled_ops
    }

    pub fn machine_edges(&self) -> &MachineEdges {
        &self.machine_edges
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.machine_edges.values().flatten().cloned().collect()
    }

    pub fn asapst(&self) -> &PathTimes {
        &self.asapst
    }

    pub fn alapst(&self) -> &PathTimes {
        &self.alapst
    }

    pub fn jobs_completion(&self) -> &[usize] {
        &self.jobs_completion
    }

    pub fn job_order(&self) -> &[JobId] {
        &self.job_order
    }

    pub fn last_operation(&self) -> &HashMap<MachineId, VertexId> {
        &self.last_operation
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn set_terminal(&mut self, value: bool) {
        self.terminal = value;
    }

    /// Recomputes `ready_ops` from `jobs_completion`, honoring the
    /// shop-type's overtaking rule: job-shops and fixed-order flow shops
    /// only make a job's single next operation ready; plain flow shops make
    /// every remaining operation of a ready job available at once (they run
    /// back-to-back without interruption once started).
    pub fn set_ready_operations(&mut self, instance: &Instance, graph: &Graph) -> Result<()> {
        self.ready_ops.clear();
        let output_order = instance.jobs_output_order();

        for (i, &job_id) in output_order.iter().enumerate() {
            let ops = instance.job_operations(job_id)?;
            let op_idx = self.jobs_completion[i];
            if op_idx >= ops.len() {
                continue;
            }

            if instance.shop_type() == ShopType::FixedOrder && i > 0 && self.jobs_completion[i - 1] <= op_idx {
                continue;
            }

            if instance.shop_type() == ShopType::FlowShop && op_idx > 0 {
                if let Some(pos) = self.job_order.iter().position(|&j| j == job_id) {
                    if pos > 0 {
                        let prev_job = self.job_order[pos - 1];
                        let prev_pos = instance.job_output_position(prev_job)?;
                        if self.jobs_completion[prev_pos] < op_idx {
                            continue;
                        }
                    }
                }
            }

            let candidates = if instance.shop_type() == ShopType::FlowShop {
                ops[op_idx..].to_vec()
            } else {
                vec![ops[op_idx]]
            };
            self.ready_ops.insert(job_id, candidates);
        }

        let _ = graph;
        Ok(())
    }
}
