use serde_json::json;
use tracing::{debug, info};

use super::{Engine, require_text};
use crate::auth::permissions;
use crate::error::{GateError, ProoflineError, Result};
use crate::events::EventType;
use crate::model::{EntityKind, Iteration};
use crate::state_machine::{IterationStatus, StateMachine};
use crate::store;

impl Engine {
    pub fn create_iteration(
        &self,
        project_id: &str,
        iteration_id: Option<&str>,
        goal: &str,
        actor: &str,
    ) -> Result<Iteration> {
        require_text("goal", goal)?;
        let iteration = self.transact("create_iteration", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::ITERATION_CREATE)?;
            let id = iteration_id
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if store::find_iteration(ctx.conn, &id)?.is_some() {
                return Err(ProoflineError::validation(format!(
                    "iteration {id} already exists"
                )));
            }
            let iteration = Iteration {
                id,
                project_id: project_id.to_string(),
                goal: goal.to_string(),
                status: IterationStatus::Pending,
                created_at: ctx.now,
            };
            store::insert_iteration(ctx.conn, &iteration)?;
            ctx.append(
                EventType::IterationCreated,
                project_id,
                EntityKind::Iteration,
                &iteration.id,
                json!({ "goal": iteration.goal, "status": iteration.status }),
            )?;
            Ok(iteration)
        })?;
        info!(project = project_id, iteration = %iteration.id, actor, "iteration created");
        Ok(iteration)
    }

    /// Move an iteration along its lifecycle. Entering `validated` without
    /// force needs the configured iteration attestation on the iteration;
    /// the outcome of that check is logged with every committed change to
    /// `validated`, forced or not.
    pub fn set_iteration_status(
        &self,
        iteration_id: &str,
        status: IterationStatus,
        actor: &str,
        force: bool,
    ) -> Result<Iteration> {
        let iteration = self.transact("set_iteration_status", actor, |ctx| {
            let mut iteration = store::get_iteration(ctx.conn, iteration_id)?;
            let project_id = iteration.project_id.clone();
            ctx.require(&project_id, permissions::ITERATION_SET_STATUS)?;
            ctx.require_force(force, &project_id, EntityKind::Iteration, iteration_id)?;
            let transition = StateMachine::transition(iteration.status, status, force)?;

            if status == IterationStatus::Validated {
                let required = ctx.config.iteration_validation_kind();
                let present = match required {
                    Some(kind) => {
                        store::has_attestation(ctx.conn, EntityKind::Iteration, iteration_id, kind)?
                    }
                    None => true,
                };
                debug!(iteration = iteration_id, required = ?required, present, "iteration validation checked");
                if !force && !present {
                    if let Some(kind) = required {
                        return Err(GateError::IterationAttestationMissing {
                            kind: kind.to_string(),
                        }
                        .into());
                    }
                }
                ctx.append(
                    EventType::IterationValidationChecked,
                    &project_id,
                    EntityKind::Iteration,
                    iteration_id,
                    json!({ "required_kind": required, "result": present, "forced": force }),
                )?;
            }

            store::set_iteration_status(ctx.conn, iteration_id, status)?;
            ctx.append(
                EventType::IterationUpdated,
                &project_id,
                EntityKind::Iteration,
                iteration_id,
                json!({ "from": transition.from, "to": transition.to, "forced": force }),
            )?;
            iteration.status = status;
            Ok(iteration)
        })?;
        info!(
            project = %iteration.project_id,
            iteration = iteration_id,
            actor,
            status = %iteration.status,
            forced = force,
            "iteration status set"
        );
        Ok(iteration)
    }
}
