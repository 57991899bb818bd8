#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use proofline::{
    CreateTask, EntityKind, Engine, ManualClock, ProoflineConfig, ProoflineError, Store, Task,
    TaskStatus, UpdateTask,
};

pub const PROJECT: &str = "acme";
/// Holds `owner` in [`PROJECT`]: every permission and every default kind.
pub const OWNER: &str = "olivia";

pub struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

pub fn harness() -> Result<Harness> {
    harness_with(ProoflineConfig::default())
}

pub fn harness_with(config: ProoflineConfig) -> Result<Harness> {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = Engine::new(Store::open_in_memory()?, config, clock.clone());
    engine.init_project(PROJECT, Some("integration"), OWNER)?;
    Ok(Harness { engine, clock })
}

impl Harness {
    /// A task whose type carries no default policy.
    pub fn plain_task(&self, id: &str) -> Result<Task> {
        let mut request = CreateTask::new(PROJECT, format!("task {id}")).of_type("workshop");
        request.id = Some(id.to_string());
        Ok(self.engine.create_task(request, OWNER)?)
    }

    pub fn typed_task(&self, id: &str, task_type: &str) -> Result<Task> {
        let mut request = CreateTask::new(PROJECT, format!("task {id}")).of_type(task_type);
        request.id = Some(id.to_string());
        Ok(self.engine.create_task(request, OWNER)?)
    }

    pub fn set_status(&self, id: &str, status: TaskStatus, actor: &str) -> proofline::Result<Task> {
        self.engine.update_task(id, UpdateTask::status(status), actor)
    }

    /// Claim as the owner and move the task to `status`, gates included.
    pub fn move_to(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.engine.claim_lease(id, OWNER, None)?;
        Ok(self.set_status(id, status, OWNER)?)
    }

    pub fn attest(&self, kind: EntityKind, id: &str, attestation: &str) -> Result<()> {
        self.engine
            .add_attestation(PROJECT, kind, id, attestation, None, OWNER)?;
        Ok(())
    }

    pub fn grant(&self, actor: &str, role: &str) -> Result<()> {
        self.engine.grant_role(PROJECT, OWNER, actor, role)?;
        Ok(())
    }

    /// Event types of the project, oldest first.
    pub fn event_types(&self) -> Result<Vec<String>> {
        Ok(self
            .engine
            .events_after(Some(PROJECT), 0, 10_000)?
            .into_iter()
            .map(|e| e.event_type)
            .collect())
    }

    pub fn last_event_id(&self) -> Result<i64> {
        Ok(self
            .engine
            .events_after(None, 0, 10_000)?
            .last()
            .map_or(0, |e| e.id))
    }
}

pub fn count(types: &[String], event_type: &str) -> usize {
    types.iter().filter(|t| t.as_str() == event_type).count()
}

pub fn is_gate(err: &ProoflineError) -> bool {
    err.kind() == proofline::ErrorKind::GatingFailed
}
