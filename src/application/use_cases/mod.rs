pub mod decision_diagram;
pub mod forward_heuristic;
pub mod maintenance;
pub mod modular;
