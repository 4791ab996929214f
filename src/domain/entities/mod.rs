pub mod delay;
pub mod graph;
pub mod ids;
pub mod instance;
pub mod operation;
pub mod option;
pub mod partial_solution;
pub mod plexity;

pub use delay::{Delay, ASAP_NEG_INF, ALAP_POS_INF};
pub use graph::{Edge, Graph, Vertex, VertexId, VertexKind};
pub use ids::{JobId, MachineId, ModuleId, OperationId, ReEntrantId, StateId};
pub use instance::{Instance, PairTable, ShopType};
pub use operation::{MaintType, Operation};
pub use option::{IdGenerator, SchedulingOption};
pub use partial_solution::{dominates, MachineEdges, PartialSolution};
pub use plexity::Plexity;
