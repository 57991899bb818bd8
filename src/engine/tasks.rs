use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Engine, TxContext, parse_json, require_text};
use crate::auth::permissions;
use crate::error::{GateError, ProoflineError, Result};
use crate::events::EventType;
use crate::gate;
use crate::model::{EntityKind, Task};
use crate::policy::{self, Policy, PolicyRequest, PolicySource};
use crate::state_machine::{StateMachine, TaskStatus, Transition};
use crate::store;

/// Input for [`Engine::create_task`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTask {
    /// Caller-chosen id; a random one is generated when absent.
    pub id: Option<String>,
    pub project_id: String,
    pub title: String,
    /// Defaults to the configured `default_task_type`.
    pub task_type: Option<String>,
    pub description: Option<String>,
    pub iteration_id: Option<String>,
    pub parent_id: Option<String>,
    pub assignee_id: Option<String>,
    pub priority: Option<i64>,
    pub depends_on: Vec<String>,
    /// Raw JSON text.
    pub work_outcomes: Option<String>,
    pub policy: PolicyRequest,
}

impl CreateTask {
    pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }
}

/// Input for [`Engine::update_task`]. `None` leaves a field alone; for the
/// doubly optional fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTask {
    pub status: Option<TaskStatus>,
    pub assignee: Option<Option<String>>,
    pub priority: Option<Option<i64>>,
    pub parent: Option<Option<String>>,
    pub add_deps: Vec<String>,
    pub remove_deps: Vec<String>,
    /// Raw JSON text. Changing it requires the lease unless forced.
    pub work_outcomes: Option<Option<String>>,
    pub policy: PolicyRequest,
    pub force: bool,
}

impl UpdateTask {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

fn policy_json(policy: &Policy) -> Value {
    json!({
        "mode": policy.mode,
        "require": policy.require,
        "threshold": policy.threshold,
    })
}

impl Engine {
    pub fn create_task(&self, request: CreateTask, actor: &str) -> Result<Task> {
        require_text("title", &request.title)?;
        require_text("project", &request.project_id)?;
        let task_type = request
            .task_type
            .clone()
            .unwrap_or_else(|| self.config.default_task_type.clone());
        if !self.config.is_task_type(&task_type) {
            return Err(ProoflineError::validation(format!(
                "unknown task type {task_type}"
            )));
        }
        let work_outcomes = request
            .work_outcomes
            .as_deref()
            .map(|raw| parse_json("work outcomes", raw))
            .transpose()?;
        let (policy, source) = policy::resolve(&self.config.policies, &task_type, &request.policy)?;

        let task = self.transact("create_task", actor, |ctx| {
            let project = store::get_project(ctx.conn, &request.project_id)?;
            ctx.require(&project.id, permissions::TASK_CREATE)?;

            if let Some(iteration_id) = &request.iteration_id {
                let iteration = store::get_iteration(ctx.conn, iteration_id)?;
                if iteration.project_id != project.id {
                    return Err(ProoflineError::validation(format!(
                        "iteration {iteration_id} is not in project {}",
                        project.id
                    )));
                }
            }
            let id = request
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if store::find_task(ctx.conn, &id)?.is_some() {
                return Err(ProoflineError::validation(format!("task {id} already exists")));
            }
            if let Some(parent_id) = &request.parent_id {
                gate::ensure_parent(ctx.conn, &project.id, &id, parent_id)?;
            }
            let depends_on = dedup(&request.depends_on);
            gate::ensure_dependencies_valid(ctx.conn, &project.id, &id, &depends_on)?;

            let task = Task {
                id,
                project_id: project.id.clone(),
                iteration_id: request.iteration_id.clone(),
                parent_id: request.parent_id.clone(),
                task_type: task_type.clone(),
                title: request.title.clone(),
                description: request.description.clone(),
                status: TaskStatus::Planned,
                assignee_id: request.assignee_id.clone(),
                priority: request.priority,
                work_outcomes: work_outcomes.clone(),
                policy: policy.clone(),
                depends_on,
                created_at: ctx.now,
                updated_at: ctx.now,
                completed_at: None,
            };
            store::insert_task(ctx.conn, &task)?;

            match &source {
                PolicySource::Override => {
                    ctx.append(
                        EventType::PolicyOverride,
                        &task.project_id,
                        EntityKind::Task,
                        &task.id,
                        policy_json(&task.policy),
                    )?;
                }
                PolicySource::Preset(name) | PolicySource::TypeDefault(name) => {
                    let mut payload = policy_json(&task.policy);
                    payload["preset_name"] = json!(name);
                    ctx.append(
                        EventType::TaskPolicyApplied,
                        &task.project_id,
                        EntityKind::Task,
                        &task.id,
                        payload,
                    )?;
                }
                PolicySource::Unset => {}
            }
            ctx.append(
                EventType::TaskCreated,
                &task.project_id,
                EntityKind::Task,
                &task.id,
                json!({ "title": task.title, "status": task.status, "type": task.task_type }),
            )?;
            Ok(task)
        })?;
        info!(
            project = %task.project_id,
            task = %task.id,
            actor,
            task_type = %task.task_type,
            policy = source.preset_name().unwrap_or("-"),
            "task created"
        );
        Ok(task)
    }

    pub fn update_task(&self, task_id: &str, update: UpdateTask, actor: &str) -> Result<Task> {
        if update.policy.preset.is_some() && update.policy.is_inline() {
            return Err(ProoflineError::validation(
                "policy preset and inline policy fields are mutually exclusive",
            ));
        }
        let work_outcomes = match &update.work_outcomes {
            Some(Some(raw)) => Some(Some(parse_json("work outcomes", raw)?)),
            Some(None) => Some(None),
            None => None,
        };

        let (task, transition) = self.transact("update_task", actor, |ctx| {
            let mut task = store::get_task(ctx.conn, task_id)?;
            let project_id = task.project_id.clone();
            ctx.require(&project_id, permissions::TASK_UPDATE)?;
            if update.status == Some(TaskStatus::Done) && task.status != TaskStatus::Done {
                ctx.require(&project_id, permissions::TASK_DONE)?;
            }
            ctx.require_force(update.force, &project_id, EntityKind::Task, task_id)?;

            match &update.parent {
                Some(Some(parent_id)) => {
                    gate::ensure_parent(ctx.conn, &project_id, task_id, parent_id)?;
                    task.parent_id = Some(parent_id.clone());
                }
                Some(None) => task.parent_id = None,
                None => {}
            }
            if let Some(assignee) = &update.assignee {
                task.assignee_id = assignee.clone().filter(|a| !a.is_empty());
            }
            if let Some(priority) = update.priority {
                task.priority = priority;
            }
            if let Some(outcomes) = work_outcomes {
                if !update.force {
                    ctx.require_lease(task_id)?;
                }
                task.work_outcomes = outcomes;
            }

            let old_policy = task.policy.clone();
            let policy_event = if let Some(name) = &update.policy.preset {
                task.policy = ctx.config.policies.preset(name)?;
                Some((EventType::TaskPolicyUpdated, Some(name.clone())))
            } else if update.policy.is_inline() {
                let next = policy::apply_inline(&task.policy, &update.policy);
                next.validate()?;
                task.policy = next;
                Some((EventType::PolicyOverride, None))
            } else {
                None
            };

            if !update.remove_deps.is_empty() {
                store::remove_dependencies(ctx.conn, task_id, &update.remove_deps)?;
            }
            if !update.add_deps.is_empty() {
                let add = dedup(&update.add_deps);
                gate::ensure_dependencies_valid(ctx.conn, &project_id, task_id, &add)?;
                store::add_dependencies(ctx.conn, task_id, &add)?;
            }

            let from = task.status;
            let transition = match update.status {
                Some(to) if to != task.status => Some(change_status(ctx, &mut task, to, update.force)?),
                _ => None,
            };
            task.updated_at = ctx.now;
            store::update_task(ctx.conn, &task)?;
            task.depends_on = store::task_dependencies(ctx.conn, task_id)?;

            if let Some((event_type, preset)) = policy_event {
                let mut payload = json!({
                    "old": policy_json(&old_policy),
                    "new": policy_json(&task.policy),
                });
                if let Some(name) = preset {
                    payload["preset_name"] = json!(name);
                }
                ctx.append(event_type, &project_id, EntityKind::Task, task_id, payload)?;
            }
            ctx.append(
                EventType::TaskUpdated,
                &project_id,
                EntityKind::Task,
                task_id,
                json!({
                    "from_status": from,
                    "to_status": task.status,
                    "forced": update.force && transition.is_some(),
                }),
            )?;
            if task.status == TaskStatus::Done && from != TaskStatus::Done {
                ctx.append(
                    EventType::TaskDone,
                    &project_id,
                    EntityKind::Task,
                    task_id,
                    json!({ "status": task.status }),
                )?;
            }
            Ok((task, transition))
        })?;
        info!(
            project = %task.project_id,
            task = task_id,
            actor,
            status = %task.status,
            forced = update.force,
            "task updated"
        );
        if let Some(t) = transition {
            debug!(task = task_id, from = %t.from, to = %t.to, forced = t.forced, "task status changed");
        }
        Ok(task)
    }

    /// Record the work outcomes and move the task to `done` through the
    /// same gates as [`Engine::update_task`].
    pub fn complete_task(
        &self,
        task_id: &str,
        work_outcomes: &str,
        actor: &str,
        force: bool,
    ) -> Result<Task> {
        let outcomes = parse_json("work outcomes", work_outcomes)?;
        let task = self.transact("complete_task", actor, |ctx| {
            let mut task = store::get_task(ctx.conn, task_id)?;
            let project_id = task.project_id.clone();
            ctx.require(&project_id, permissions::TASK_DONE)?;
            ctx.require_force(force, &project_id, EntityKind::Task, task_id)?;

            task.work_outcomes = Some(outcomes);
            let transition = change_status(ctx, &mut task, TaskStatus::Done, force)?;
            task.updated_at = ctx.now;
            store::update_task(ctx.conn, &task)?;
            ctx.append(
                EventType::TaskDone,
                &project_id,
                EntityKind::Task,
                task_id,
                json!({
                    "status": task.status,
                    "from_status": transition.from,
                    "forced": force,
                }),
            )?;
            Ok(task)
        })?;
        info!(project = %task.project_id, task = task_id, actor, forced = force, "task completed");
        Ok(task)
    }
}

/// Move `task` to `to`. Without force the gates run in order: lifecycle
/// edge, lease, dependencies, sub-tasks, then the attestation policy (the
/// last three only when entering `done`). With force every gate is skipped.
fn change_status(
    ctx: &TxContext<'_>,
    task: &mut Task,
    to: TaskStatus,
    force: bool,
) -> Result<Transition<TaskStatus>> {
    let from = task.status;
    let transition = if force {
        StateMachine::transition(from, to, true)?
    } else {
        let transition = StateMachine::transition(from, to, false)?;
        ctx.require_lease(&task.id)?;
        if to == TaskStatus::Done {
            gate::ensure_dependencies_done(ctx.conn, &task.project_id, &task.id)?;
            gate::ensure_subtasks_done(ctx.conn, &task.id)?;
            let present = store::attestation_kinds(ctx.conn, EntityKind::Task, &task.id)?;
            let report = task.policy.evaluate(present.iter().map(String::as_str));
            debug!(
                task = %task.id,
                mode = %report.mode,
                satisfied = report.satisfied,
                missing = ?report.missing,
                "policy evaluated"
            );
            if !report.satisfied {
                return Err(GateError::PolicyNotSatisfied {
                    missing: report.missing,
                }
                .into());
            }
        }
        transition
    };

    task.status = to;
    if to == TaskStatus::Done {
        task.completed_at = Some(ctx.now);
    } else if from == TaskStatus::Done {
        task.completed_at = None;
    }
    Ok(transition)
}
