use serde_json::json;
use tracing::info;

use super::{Engine, parse_json, require_text};
use crate::auth::permissions;
use crate::error::{ProoflineError, Result};
use crate::events::EventType;
use crate::model::{Attestation, EntityKind};
use crate::store;

impl Engine {
    /// Record proof of `kind` against a project, task, iteration or decision.
    /// Attestations are never edited or removed afterwards.
    pub fn add_attestation(
        &self,
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        kind: &str,
        payload: Option<&str>,
        actor: &str,
    ) -> Result<Attestation> {
        require_text("entity id", entity_id)?;
        require_text("attestation kind", kind)?;
        let payload = payload.map(|raw| parse_json("attestation payload", raw)).transpose()?;

        let attestation = self.transact("add_attestation", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::ATTESTATION_ADD)?;
            ctx.require_attestation_authority(project_id, kind)?;

            let owner = match entity_kind {
                EntityKind::Project => Some(project_id.to_string()).filter(|p| p == entity_id),
                EntityKind::Task => store::find_task(ctx.conn, entity_id)?.map(|t| t.project_id),
                EntityKind::Iteration => {
                    store::find_iteration(ctx.conn, entity_id)?.map(|i| i.project_id)
                }
                EntityKind::Decision => {
                    store::find_decision(ctx.conn, entity_id)?.map(|d| d.project_id)
                }
                other => {
                    return Err(ProoflineError::validation(format!(
                        "attestations cannot target a {other}"
                    )));
                }
            };
            if owner.as_deref() != Some(project_id) {
                return Err(ProoflineError::not_found(entity_kind, entity_id));
            }

            let attestation = Attestation {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                entity_kind,
                entity_id: entity_id.to_string(),
                kind: kind.to_string(),
                actor_id: ctx.actor.to_string(),
                ts: ctx.now,
                payload: payload.clone(),
            };
            store::insert_attestation(ctx.conn, &attestation)?;
            ctx.append(
                EventType::AttestationAdded,
                project_id,
                entity_kind,
                entity_id,
                json!({ "kind": kind, "attestation_id": attestation.id }),
            )?;
            Ok(attestation)
        })?;
        info!(
            project = project_id,
            entity = entity_id,
            entity_kind = %entity_kind,
            kind,
            actor,
            "attestation added"
        );
        Ok(attestation)
    }
}
