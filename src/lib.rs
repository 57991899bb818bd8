//! Proofline: a transactional workflow engine for attested delivery.
//!
//! Projects hold tasks and iterations that move through fixed state
//! machines. A status change commits only when its gates pass: a live lease,
//! finished dependencies and sub-tasks, and the attestations its policy
//! requires. Every mutation is authorized through per-project roles and
//! appended to an id-ordered event log, all inside one SQLite transaction.

pub mod auth;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod gate;
mod lease;
pub mod model;
pub mod policy;
pub mod state_machine;
pub mod store;

pub use auth::{WhoAmI, permissions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProoflineConfig;
pub use engine::{CreateDecision, CreateTask, Engine, UpdateTask};
pub use error::{ErrorKind, GateError, LeaseError, ProoflineError, Result};
pub use events::{EventFilter, EventType};
pub use lease::MAX_TTL_SECS as MAX_LEASE_TTL_SECS;
pub use model::{
    Attestation, Decision, EntityKind, Event, Iteration, Lease, Project, ProjectStatus, Task,
};
pub use policy::{Policy, PolicyReport, PolicyRequest, ValidationMode};
pub use state_machine::{IterationStatus, TaskStatus};
pub use store::{AttestationFilter, Store, TaskFilter};
