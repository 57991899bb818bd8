use serde_json::json;
use tracing::info;

use super::{Engine, parse_json, require_text};
use crate::auth::permissions;
use crate::error::{ProoflineError, Result};
use crate::events::EventType;
use crate::model::{Decision, EntityKind};
use crate::store;

/// Input for [`Engine::create_decision`]. The optional fields carry raw
/// JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDecision {
    pub id: Option<String>,
    pub project_id: String,
    pub title: String,
    pub decision: String,
    pub context: Option<String>,
    pub rationale: Option<String>,
    pub alternatives: Option<String>,
}

impl Engine {
    pub fn create_decision(&self, request: CreateDecision, actor: &str) -> Result<Decision> {
        require_text("title", &request.title)?;
        require_text("decision", &request.decision)?;
        let json_field = |field: &str, raw: &Option<String>| {
            raw.as_deref().map(|r| parse_json(field, r)).transpose()
        };
        let context = json_field("context", &request.context)?;
        let rationale = json_field("rationale", &request.rationale)?;
        let alternatives = json_field("alternatives", &request.alternatives)?;

        let decision = self.transact("create_decision", actor, |ctx| {
            store::get_project(ctx.conn, &request.project_id)?;
            ctx.require(&request.project_id, permissions::DECISION_CREATE)?;
            let decision = Decision {
                id: request
                    .id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                project_id: request.project_id.clone(),
                title: request.title.clone(),
                decision: request.decision.clone(),
                context: context.clone(),
                rationale: rationale.clone(),
                alternatives: alternatives.clone(),
                decider_id: ctx.actor.to_string(),
                created_at: ctx.now,
            };
            if store::find_decision(ctx.conn, &decision.id)?.is_some() {
                return Err(ProoflineError::validation(format!(
                    "decision {} already exists",
                    decision.id
                )));
            }
            store::insert_decision(ctx.conn, &decision)?;
            ctx.append(
                EventType::DecisionCreated,
                &decision.project_id,
                EntityKind::Decision,
                &decision.id,
                json!({ "title": decision.title }),
            )?;
            Ok(decision)
        })?;
        info!(project = %decision.project_id, decision = %decision.id, actor, "decision recorded");
        Ok(decision)
    }
}
