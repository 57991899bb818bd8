use chrono::Duration;
use serde_json::json;
use tracing::info;

use super::Engine;
use crate::auth::permissions;
use crate::error::{LeaseError, ProoflineError, Result};
use crate::events::EventType;
use crate::lease;
use crate::model::{EntityKind, Lease};
use crate::store;

impl Engine {
    /// Take, renew or steal an expired lease on a task. `ttl_secs` falls
    /// back to `lease.ttl_secs` from configuration.
    pub fn claim_lease(&self, task_id: &str, actor: &str, ttl_secs: Option<u64>) -> Result<Lease> {
        let ttl_secs = ttl_secs.unwrap_or(self.config.lease.ttl_secs);
        if ttl_secs == 0 {
            return Err(ProoflineError::validation("lease ttl must be positive"));
        }
        if ttl_secs > lease::MAX_TTL_SECS {
            return Err(ProoflineError::validation(format!(
                "lease ttl {ttl_secs}s exceeds the maximum of {}s",
                lease::MAX_TTL_SECS
            )));
        }
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| ProoflineError::validation(format!("lease ttl {ttl_secs}s is too large")))?;

        let granted = self.transact("claim_lease", actor, |ctx| {
            let task = store::get_task(ctx.conn, task_id)?;
            ctx.require(&task.project_id, permissions::TASK_CLAIM)?;
            let existing = store::find_lease(ctx.conn, task_id)?;
            lease::check_claim(task_id, existing.as_ref(), ctx.actor, ctx.now)?;

            let granted = lease::grant(task_id, ctx.actor, ctx.now, ttl)?;
            store::upsert_lease(ctx.conn, &task.project_id, &granted)?;
            ctx.append(
                EventType::LeaseClaimed,
                &task.project_id,
                EntityKind::Task,
                task_id,
                json!({
                    "owner_id": granted.owner_id,
                    "expires_at": granted.expires_at,
                    "previous_owner": existing.map(|l| l.owner_id),
                }),
            )?;
            Ok(granted)
        })?;
        info!(task = task_id, actor, expires_at = %granted.expires_at, "lease claimed");
        Ok(granted)
    }

    /// Drop the lease on a task. Without `force` only the owner may release
    /// a live lease; an expired one may be cleared by anyone allowed to
    /// release.
    pub fn release_lease(&self, task_id: &str, actor: &str, force: bool) -> Result<()> {
        let released = self.transact("release_lease", actor, |ctx| {
            let task = store::get_task(ctx.conn, task_id)?;
            ctx.require(&task.project_id, permissions::TASK_RELEASE)?;
            ctx.require_force(force, &task.project_id, EntityKind::Task, task_id)?;
            let Some(current) = store::find_lease(ctx.conn, task_id)? else {
                return Err(LeaseError::Required {
                    task_id: task_id.to_string(),
                }
                .into());
            };
            if !force {
                lease::check_release(&current, ctx.actor, ctx.now)?;
            }
            store::delete_lease(ctx.conn, task_id)?;
            ctx.append(
                EventType::LeaseReleased,
                &task.project_id,
                EntityKind::Task,
                task_id,
                json!({ "owner_id": current.owner_id, "forced": force }),
            )?;
            Ok(current)
        })?;
        info!(task = task_id, actor, owner = %released.owner_id, forced = force, "lease released");
        Ok(())
    }
}
