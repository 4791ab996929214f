//! Strong identifier types for jobs, operations, machines and graph vertices.
//!
//! All of these are thin newtypes over `u32`. Ordering and equality are
//! value-based; arithmetic is not implemented on purpose so that a `JobId`
//! can never accidentally be added to a `MachineId`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(v: u32) -> Self {
                $name(v)
            }

            pub const fn value(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }
    };
}

id_type!(JobId);
id_type!(OperationId);
id_type!(MachineId);
id_type!(ReEntrantId);
id_type!(ModuleId);
/// Index into the constraint graph's dense vertex vector. Never reused.
id_type!(VertexId);
/// Index into the decision-diagram state arena. Never reused.
id_type!(StateId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_ordered_by_value() {
        assert!(JobId(1) < JobId(2));
        assert_eq!(JobId(3), JobId::from(3));
    }

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(format!("{}", MachineId(7)), "7");
    }
}
