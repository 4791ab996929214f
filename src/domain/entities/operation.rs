//! An operation within a job, optionally tagged as a maintenance action.

use super::ids::{JobId, OperationId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Index of a maintenance class; distinguishes which maintenance policy
/// produced a given maintenance vertex.
pub type MaintType = u32;

/// `(JobId, OperationId)`, with an optional maintenance-class tag that is
/// ignored by equality, ordering, and hashing (see `SPEC_FULL.md` §9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Operation {
    pub job_id: JobId,
    pub operation_id: OperationId,
    pub maint_id: Option<MaintType>,
}

impl Operation {
    pub fn new(job_id: JobId, operation_id: OperationId) -> Self {
        Operation {
            job_id,
            operation_id,
            maint_id: None,
        }
    }

    pub fn with_maint_class(job_id: JobId, operation_id: OperationId, maint_id: MaintType) -> Self {
        Operation {
            job_id,
            operation_id,
            maint_id: Some(maint_id),
        }
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.job_id == other.job_id && self.operation_id == other.operation_id
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.job_id.hash(state);
        self.operation_id.hash(state);
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operation {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.job_id, self.operation_id).cmp(&(other.job_id, other.operation_id))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.job_id, self.operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_maintenance_tag() {
        let a = Operation::new(JobId(1), OperationId(2));
        let b = Operation::with_maint_class(JobId(1), OperationId(2), 9);
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_job_then_operation() {
        let a = Operation::new(JobId(1), OperationId(5));
        let b = Operation::new(JobId(2), OperationId(0));
        assert!(a < b);
    }
}
