//! Persisted records of a project's workflow state.
//!
//! These are plain data types: every rule about how they may change lives
//! in [`crate::state_machine`], [`crate::gate`], [`crate::policy`] and the
//! engine. Children of a task are never stored on the task itself; they are
//! found by querying the `parent_id` column.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProoflineError;
use crate::policy::Policy;
use crate::state_machine::{IterationStatus, TaskStatus};

/// The kind of entity an event, attestation or lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Task,
    Iteration,
    Decision,
    Attestation,
    Lease,
    Role,
    Rbac,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::Iteration => "iteration",
            EntityKind::Decision => "decision",
            EntityKind::Attestation => "attestation",
            EntityKind::Lease => "lease",
            EntityKind::Role => "role",
            EntityKind::Rbac => "rbac",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EntityKind::Project),
            "task" => Ok(EntityKind::Task),
            "iteration" => Ok(EntityKind::Iteration),
            "decision" => Ok(EntityKind::Decision),
            "attestation" => Ok(EntityKind::Attestation),
            "lease" => Ok(EntityKind::Lease),
            "role" => Ok(EntityKind::Role),
            "rbac" => Ok(EntityKind::Rbac),
            other => Err(ProoflineError::validation(format!(
                "unknown entity kind {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "paused" => Ok(ProjectStatus::Paused),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(ProoflineError::validation(format!(
                "unknown project status {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub org_id: String,
    pub status: ProjectStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub iteration_id: Option<String>,
    pub parent_id: Option<String>,
    pub task_type: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    pub priority: Option<i64>,
    /// Free-form proof of the work that was done, always valid JSON.
    pub work_outcomes: Option<serde_json::Value>,
    pub policy: Policy,
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub project_id: String,
    pub goal: String,
    pub status: IterationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub task_id: String,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: String,
    pub project_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub kind: String,
    pub actor_id: String,
    pub ts: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub decision: String,
    pub context: Option<serde_json::Value>,
    pub rationale: Option<serde_json::Value>,
    pub alternatives: Option<serde_json::Value>,
    pub decider_id: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub project_id: Option<String>,
    pub entity_kind: EntityKind,
    pub entity_id: Option<String>,
    pub actor_id: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in [
            EntityKind::Project,
            EntityKind::Task,
            EntityKind::Iteration,
            EntityKind::Decision,
            EntityKind::Attestation,
            EntityKind::Lease,
            EntityKind::Role,
            EntityKind::Rbac,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("sprint".parse::<EntityKind>().is_err());
    }

    #[test]
    fn project_status_rejects_unknown() {
        assert_eq!(
            "paused".parse::<ProjectStatus>().unwrap(),
            ProjectStatus::Paused
        );
        let err = "closed".parse::<ProjectStatus>().unwrap_err();
        assert_eq!(err.to_string(), "validation error: unknown project status closed");
    }
}
