use thiserror::Error;

use crate::model::EntityKind;

pub type Result<T, E = ProoflineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProoflineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("invalid {entity} status transition {from} -> {to}")]
    InvalidTransition {
        entity: EntityKind,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error("permission {permission} required")]
    Forbidden { permission: String },

    #[error("attestation authority required for kind {kind}")]
    ForbiddenAttestation { kind: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A structural or policy prerequisite that was not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("dependency {task_id} not done")]
    DependencyNotDone { task_id: String },

    #[error("dependency {task_id} not in project {project_id}")]
    DependencyOutsideProject { task_id: String, project_id: String },

    #[error("subtask {task_id} not done")]
    SubtaskNotDone { task_id: String },

    #[error("validation policy not satisfied; missing {}", missing.join(", "))]
    PolicyNotSatisfied { missing: Vec<String> },

    #[error("attestation {kind} required for iteration validation")]
    IterationAttestationMissing { kind: String },

    #[error("task hierarchy cycle detected: {task_id} cannot be placed under {parent_id}")]
    HierarchyCycle { task_id: String, parent_id: String },

    #[error("dependency cycle detected: {task_id} -> {depends_on} closes a loop")]
    DependencyCycle { task_id: String, depends_on: String },
}

/// Lease ownership failures. Each condition is reported separately so the
/// caller knows whether to claim, re-claim or wait.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("lease required on task {task_id}; none exists")]
    Required { task_id: String },

    #[error("lease on task {task_id} expired; reacquire")]
    Expired { task_id: String },

    #[error("lease on task {task_id} owned by different actor {owner}")]
    WrongOwner { task_id: String, owner: String },

    #[error("lease on task {task_id} already held by {owner} until {expires_at}")]
    Held {
        task_id: String,
        owner: String,
        expires_at: String,
    },
}

/// Coarse classification used by callers to map a failure onto their own
/// boundary (exit code, HTTP status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    GatingFailed,
    LeaseConflict,
    Forbidden,
    ForbiddenAttestation,
    Validation,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::GatingFailed => "gating_failed",
            ErrorKind::LeaseConflict => "lease_conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ForbiddenAttestation => "forbidden_attestation",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl ProoflineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProoflineError::NotFound { .. } => ErrorKind::NotFound,
            ProoflineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ProoflineError::Gate(_) => ErrorKind::GatingFailed,
            ProoflineError::Lease(_) => ErrorKind::LeaseConflict,
            ProoflineError::Forbidden { .. } => ErrorKind::Forbidden,
            ProoflineError::ForbiddenAttestation { .. } => ErrorKind::ForbiddenAttestation,
            ProoflineError::Validation(_) | ProoflineError::Config(_) => ErrorKind::Validation,
            ProoflineError::Storage(_)
            | ProoflineError::Json(_)
            | ProoflineError::Io(_)
            | ProoflineError::Toml(_)
            | ProoflineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        ProoflineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ProoflineError::Validation(message.into())
    }
}
