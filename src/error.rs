//! Structured error types, grouped into the three disjoint families of
//! `SPEC_FULL.md` §7: input errors, infeasibility, and (separately, not an
//! error) budget exhaustion.

use crate::domain::entities::graph::VertexId;
use crate::domain::entities::ids::{JobId, MachineId, ModuleId};
use crate::domain::entities::operation::Operation;
use thiserror::Error;

/// A cycle whose total weight is positive, witnessing infeasibility of the
/// difference-constraint system. Listed as a sequence of edges
/// `(from, to, weight)` walked in cycle order.
pub type PositiveCycle = Vec<(VertexId, VertexId, i64)>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    // --- Input errors (fatal, no recovery attempted) -----------------
    #[error("operation {0} is referenced but was never declared in the flow vector")]
    UnknownOperation(Operation),

    #[error("vertex id {0} is out of range (0..{1})")]
    VertexOutOfRange(VertexId, usize),

    #[error("no vertex registered for job {0}")]
    UnknownJob(JobId),

    #[error("no source vertex registered for machine {0}")]
    UnknownMachine(MachineId),

    #[error("no edge from {0} to {1}")]
    NoSuchEdge(VertexId, VertexId),

    #[error("due date from {from} to {to} is self-referential or would require reversed time flow")]
    IncoherentDueDate { from: Operation, to: Operation },

    #[error("malformed instance: {0}")]
    InconsistentInput(String),

    #[error("failed to parse instance document: {0}")]
    ParseError(String),

    // --- Infeasibility -------------------------------------------------
    #[error("constraint graph contains a positive cycle: {0:?}")]
    PositiveCycleDetected(PositiveCycle),

    #[error("windowed relaxation would have modified a committed vertex {0}")]
    WindowViolation(VertexId),

    #[error("no feasible option remains for job {0}")]
    NoFeasibleOption(JobId),

    #[error("maintenance insertion on machine {0} is infeasible")]
    MaintenanceInfeasible(MachineId),

    #[error("propagating the transfer into module {0} for job {1} would create a positive cycle")]
    TransferInfeasible(ModuleId, JobId),

    #[error("job {1} misses its transfer due date into module {0}")]
    TransferDueDateExceeded(ModuleId, JobId),

    #[error("no solution found before the search space was exhausted")]
    NoSolution,

    #[error("module dependency graph contains a cycle the configured strategy cannot resolve")]
    ModuleGraphCycle,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
