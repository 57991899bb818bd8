//! Read-only access. None of these need a permission or touch the event log.

use super::Engine;
use crate::error::Result;
use crate::events::{self, EventFilter};
use crate::lease;
use crate::model::{Attestation, Decision, EntityKind, Event, Iteration, Lease, Project, Task};
use crate::policy::PolicyReport;
use crate::store::{self, AttestationFilter, TaskFilter};

impl Engine {
    pub fn get_project(&self, project_id: &str) -> Result<Project> {
        self.query(|conn| store::get_project(conn, project_id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.query(store::list_projects)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.query(|conn| store::get_task(conn, task_id))
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.query(|conn| store::list_tasks(conn, filter))
    }

    /// Direct children of a task.
    pub fn subtasks(&self, task_id: &str) -> Result<Vec<Task>> {
        self.query(|conn| {
            store::get_task(conn, task_id)?;
            store::list_tasks(
                conn,
                &TaskFilter {
                    parent_id: Some(task_id.to_string()),
                    ..TaskFilter::default()
                },
            )
        })
    }

    pub fn get_iteration(&self, iteration_id: &str) -> Result<Iteration> {
        self.query(|conn| store::get_iteration(conn, iteration_id))
    }

    pub fn list_iterations(&self, project_id: &str) -> Result<Vec<Iteration>> {
        self.query(|conn| store::list_iterations(conn, project_id))
    }

    pub fn get_decision(&self, decision_id: &str) -> Result<Decision> {
        self.query(|conn| store::get_decision(conn, decision_id))
    }

    pub fn list_decisions(&self, project_id: &str) -> Result<Vec<Decision>> {
        self.query(|conn| store::list_decisions(conn, project_id))
    }

    /// The lease row on a task, if any, and whether it is still live.
    pub fn get_lease(&self, task_id: &str) -> Result<Option<(Lease, bool)>> {
        let now = self.now();
        self.query(|conn| {
            store::get_task(conn, task_id)?;
            Ok(store::find_lease(conn, task_id)?.map(|l| {
                let live = lease::is_live(&l, now);
                (l, live)
            }))
        })
    }

    pub fn list_attestations(&self, filter: &AttestationFilter) -> Result<Vec<Attestation>> {
        self.query(|conn| store::list_attestations(conn, filter))
    }

    /// How far a task is from satisfying its attestation policy.
    pub fn task_validation(&self, task_id: &str) -> Result<PolicyReport> {
        self.query(|conn| {
            let task = store::get_task(conn, task_id)?;
            let present = store::attestation_kinds(conn, EntityKind::Task, task_id)?;
            Ok(task.policy.evaluate(present.iter().map(String::as_str)))
        })
    }

    /// Events after `cursor`, oldest first; `None` spans every project.
    pub fn events_after(
        &self,
        project_id: Option<&str>,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<Event>> {
        self.query(|conn| events::events_after(conn, project_id, cursor, limit))
    }

    pub fn latest_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        self.query(|conn| events::latest_events(conn, filter))
    }
}
