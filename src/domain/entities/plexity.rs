//! How many times a job re-enters a given re-entrant machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plexity {
    Simplex = 1,
    Duplex = 2,
}

impl Plexity {
    pub fn number_of_ops(self) -> u32 {
        self as u32
    }

    pub const fn max_ops() -> u32 {
        2
    }
}

impl fmt::Display for Plexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plexity::Simplex => write!(f, "SIMPLEX"),
            Plexity::Duplex => write!(f, "DUPLEX"),
        }
    }
}

impl FromStr for Plexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SIMPLEX" | "1" => Ok(Plexity::Simplex),
            "DUPLEX" | "2" => Ok(Plexity::Duplex),
            other => Err(format!("unknown plexity: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("simplex".parse::<Plexity>().unwrap(), Plexity::Simplex);
        assert_eq!("DUPLEX".parse::<Plexity>().unwrap(), Plexity::Duplex);
        assert!("triplex".parse::<Plexity>().is_err());
    }

    #[test]
    fn number_of_ops_matches_variant() {
        assert_eq!(Plexity::Simplex.number_of_ops(), 1);
        assert_eq!(Plexity::Duplex.number_of_ops(), 2);
    }
}
