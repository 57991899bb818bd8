use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Lifecycle;
use crate::error::ProoflineError;
use crate::model::EntityKind;

/// Status of an iteration: pending → running → delivered → validated, with
/// `rejected` reachable from running or delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pending,
    Running,
    Delivered,
    Validated,
    Rejected,
}

impl IterationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationStatus::Pending => "pending",
            IterationStatus::Running => "running",
            IterationStatus::Delivered => "delivered",
            IterationStatus::Validated => "validated",
            IterationStatus::Rejected => "rejected",
        }
    }
}

impl Lifecycle for IterationStatus {
    const ENTITY: EntityKind = EntityKind::Iteration;

    fn successors(self) -> &'static [Self] {
        use IterationStatus::*;
        match self {
            Pending => &[Running],
            Running => &[Delivered, Rejected],
            Delivered => &[Validated, Rejected],
            Validated | Rejected => &[],
        }
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationStatus {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IterationStatus::Pending),
            "running" => Ok(IterationStatus::Running),
            "delivered" => Ok(IterationStatus::Delivered),
            "validated" => Ok(IterationStatus::Validated),
            "rejected" => Ok(IterationStatus::Rejected),
            other => Err(ProoflineError::validation(format!(
                "unknown iteration status {other}"
            ))),
        }
    }
}
