//! Command-line surface: `jobweaver solve` for a single instance,
//! `jobweaver solve-modular` for a production line of modules.
//!
//! Grounded in the teacher's `Cli`/`Commands` clap-derive shape
//! (`#[command]` subcommands, a shared `--verbose` flag).

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::value_objects::solver_config::{ExplorationType, SearchPolicy, SolverConfig};

#[derive(Parser, Debug)]
#[command(name = "jobweaver")]
#[command(author = "JobWeaver Team")]
#[command(version = "0.1.0")]
#[command(about = "Constraint-graph scheduler for re-entrant flow-shop and job-shop problems", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Schedule a single-shop instance")]
    Solve {
        #[arg(short, long, value_name = "FILE", help = "XML instance file")]
        input: PathBuf,

        #[arg(long, value_name = "FILE", help = "JSON sequence file seeding or replacing the search")]
        sequence: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "forward", help = "Search policy")]
        policy: PolicyArg,

        #[arg(long, value_enum, default_value = "best", help = "Decision-diagram exploration discipline")]
        exploration: ExplorationArg,

        #[arg(long, value_name = "SECS", default_value = "60", help = "Wall-clock search budget")]
        time_budget: u64,

        #[arg(long, value_name = "N", default_value = "100000", help = "Iteration cap")]
        iteration_limit: u64,

        #[arg(long, value_name = "DIR", default_value = "output", help = "Output directory")]
        output_dir: PathBuf,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: FormatArg,
    },

    #[command(about = "Solve a production line of modules")]
    SolveModular {
        #[arg(short, long, value_name = "PATH", help = "Directory of module XML files, or a single MODULAR instance file")]
        input: PathBuf,

        #[arg(long, value_enum, default_value = "broadcast", help = "Round traversal strategy")]
        strategy: StrategyArg,

        #[arg(long, value_name = "N", default_value = "50", help = "Maximum number of propagation rounds")]
        max_rounds: u32,

        #[arg(long, value_name = "DIR", default_value = "output", help = "Output directory")]
        output_dir: PathBuf,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Forward,
    Dd,
}

impl From<PolicyArg> for SearchPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Forward => SearchPolicy::Forward,
            PolicyArg::Dd => SearchPolicy::DecisionDiagram,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExplorationArg {
    Depth,
    Breadth,
    Best,
    Static,
    Adaptive,
}

impl From<ExplorationArg> for ExplorationType {
    fn from(value: ExplorationArg) -> Self {
        match value {
            ExplorationArg::Depth => ExplorationType::Depth,
            ExplorationArg::Breadth => ExplorationType::Breadth,
            ExplorationArg::Best => ExplorationType::Best,
            ExplorationArg::Static => ExplorationType::Static,
            ExplorationArg::Adaptive => ExplorationType::Adaptive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Broadcast,
    Cocktail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Cbor,
    Text,
    Dot,
    Tikz,
    All,
}

impl FormatArg {
    pub fn wants_json(&self) -> bool {
        matches!(self, FormatArg::Json | FormatArg::All)
    }
    pub fn wants_cbor(&self) -> bool {
        matches!(self, FormatArg::Cbor | FormatArg::All)
    }
    pub fn wants_text(&self) -> bool {
        matches!(self, FormatArg::Text | FormatArg::All)
    }
    pub fn wants_dot(&self) -> bool {
        matches!(self, FormatArg::Dot | FormatArg::All)
    }
    pub fn wants_tikz(&self) -> bool {
        matches!(self, FormatArg::Tikz | FormatArg::All)
    }
}

impl Commands {
    /// The shared solver configuration for the `Solve` variant; the
    /// `SolveModular` variant takes its own `ModularConfig` instead.
    pub fn solver_config(&self) -> SolverConfig {
        match self {
            Commands::Solve { policy, exploration, time_budget, iteration_limit, sequence, .. } => SolverConfig {
                policy: (*policy).into(),
                exploration: (*exploration).into(),
                time_budget: Duration::from_secs(*time_budget),
                iteration_limit: *iteration_limit,
                seed_sequence: sequence.clone(),
                ..SolverConfig::default()
            },
            Commands::SolveModular { .. } => SolverConfig::default(),
        }
    }
}
