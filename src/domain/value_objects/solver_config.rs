//! Runtime knobs for a solve: which search policy to run, how it explores
//! its state space, how the forward heuristic weighs its objectives, and the
//! budgets that bound the search.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPolicy {
    Forward,
    DecisionDiagram,
}

impl FromStr for SearchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(SearchPolicy::Forward),
            "dd" | "decision-diagram" => Ok(SearchPolicy::DecisionDiagram),
            other => Err(format!("unknown search policy: {other}")),
        }
    }
}

/// Which discipline the decision-diagram search uses to order its open list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationType {
    Depth,
    Breadth,
    Best,
    Static,
    Adaptive,
}

impl FromStr for ExplorationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "depth" => Ok(ExplorationType::Depth),
            "breadth" => Ok(ExplorationType::Breadth),
            "best" => Ok(ExplorationType::Best),
            "static" => Ok(ExplorationType::Static),
            "adaptive" => Ok(ExplorationType::Adaptive),
            other => Err(format!("unknown exploration type: {other}")),
        }
    }
}

/// Weights and budgets shared by the forward heuristic and the
/// decision-diagram search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub policy: SearchPolicy,
    pub exploration: ExplorationType,

    /// Weight on the flexibility (earliest-start-of-future-work) objective.
    pub w_flex: f64,
    /// Weight on the productivity (average machine utilization) objective.
    pub w_prod: f64,
    /// Weight on the tie-breaking (operations-in-loop) objective.
    pub w_tie: f64,

    /// Starting mix of best-first vs. depth-first exploration for
    /// `ExplorationType::Adaptive`; ignored by the other disciplines.
    pub rank_factor: f64,

    pub time_budget: Duration,
    pub iteration_limit: u64,

    /// Keep every non-dominated partial solution instead of only the single
    /// best one (decision-diagram search only).
    pub keep_pareto_front: bool,

    /// An externally supplied starting sequence to seed the search instead
    /// of building one from scratch.
    pub seed_sequence: Option<PathBuf>,

    /// Interval, in cumulative machine processing time, after which a
    /// maintenance action is due.
    pub maintenance_interval: Option<i64>,
    /// How long a triggered maintenance action occupies the machine.
    /// Ignored when `maintenance_interval` is `None`.
    pub maintenance_duration: i64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            policy: SearchPolicy::Forward,
            exploration: ExplorationType::Best,
            w_flex: 1.0,
            w_prod: 1.0,
            w_tie: 1.0,
            rank_factor: 0.5,
            time_budget: Duration::from_secs(60),
            iteration_limit: 100_000,
            keep_pareto_front: false,
            seed_sequence: None,
            maintenance_interval: None,
            maintenance_duration: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Forward".parse::<SearchPolicy>().unwrap(), SearchPolicy::Forward);
        assert_eq!("dd".parse::<SearchPolicy>().unwrap(), SearchPolicy::DecisionDiagram);
        assert!("unknown".parse::<SearchPolicy>().is_err());
    }

    #[test]
    fn exploration_parses_every_named_variant() {
        for (s, expect) in [
            ("depth", ExplorationType::Depth),
            ("breadth", ExplorationType::Breadth),
            ("best", ExplorationType::Best),
            ("static", ExplorationType::Static),
            ("adaptive", ExplorationType::Adaptive),
        ] {
            assert_eq!(s.parse::<ExplorationType>().unwrap(), expect);
        }
    }
}
