use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Lifecycle;
use crate::error::ProoflineError;
use crate::model::EntityKind;

/// Status of a task.
///
/// Work flows planned → in_progress → review → done; `rejected` and
/// `canceled` are the alternate exits and `rejected → planned` is the only
/// way back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planned,
    InProgress,
    Review,
    Done,
    Rejected,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Planned => "planned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Canceled => "canceled",
        }
    }
}

impl Lifecycle for TaskStatus {
    const ENTITY: EntityKind = EntityKind::Task;

    fn successors(self) -> &'static [Self] {
        use TaskStatus::*;
        match self {
            Planned => &[InProgress, Canceled, Review, Done],
            InProgress => &[Rejected, Canceled, Review, Done],
            Review => &[Done, Rejected],
            Rejected => &[Planned],
            Done | Canceled => &[],
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(TaskStatus::Planned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            "rejected" => Ok(TaskStatus::Rejected),
            "canceled" => Ok(TaskStatus::Canceled),
            other => Err(ProoflineError::validation(format!(
                "unknown task status {other}"
            ))),
        }
    }
}
