//! The standardized summary a solve emits on exit, independent of whether it
//! succeeded, ran out of budget, or proved infeasibility.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    Optimal,
    NoSolution,
    TimeOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitReport {
    pub solved: bool,
    pub termination_reason: TerminationReason,
    pub makespan: Option<i64>,
    pub productivity: f64,
    pub flexibility: f64,
    pub iterations: u64,
    pub elapsed_secs: f64,
}

impl ExitReport {
    pub fn optimal(makespan: i64, productivity: f64, flexibility: f64, iterations: u64, elapsed_secs: f64) -> Self {
        ExitReport {
            solved: true,
            termination_reason: TerminationReason::Optimal,
            makespan: Some(makespan),
            productivity,
            flexibility,
            iterations,
            elapsed_secs,
        }
    }

    pub fn time_out(best_makespan: Option<i64>, iterations: u64, elapsed_secs: f64) -> Self {
        ExitReport {
            solved: best_makespan.is_some(),
            termination_reason: TerminationReason::TimeOut,
            makespan: best_makespan,
            productivity: 0.0,
            flexibility: 0.0,
            iterations,
            elapsed_secs,
        }
    }

    pub fn no_solution(iterations: u64, elapsed_secs: f64) -> Self {
        ExitReport {
            solved: false,
            termination_reason: TerminationReason::NoSolution,
            makespan: None,
            productivity: 0.0,
            flexibility: 0.0,
            iterations,
            elapsed_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_reason_serializes_kebab_case() {
        let json = serde_json::to_string(&TerminationReason::NoSolution).unwrap();
        assert_eq!(json, "\"no-solution\"");
    }
}
