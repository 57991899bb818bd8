use serde_json::json;
use tracing::info;

use super::{Engine, require_text};
use crate::auth::{self, WhoAmI, permissions};
use crate::error::Result;
use crate::events::EventType;
use crate::model::EntityKind;
use crate::store;

impl Engine {
    pub fn grant_role(&self, project_id: &str, actor: &str, target: &str, role: &str) -> Result<()> {
        require_text("target actor", target)?;
        let granted = self.transact("grant_role", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::RBAC_MANAGE)?;
            store::require_role(ctx.conn, project_id, role)?;
            store::ensure_actor(ctx.conn, target, ctx.now)?;
            let granted = store::assign_role(ctx.conn, project_id, target, role)?;
            ctx.append(
                EventType::RbacRoleGranted,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "actor_id": target, "role_id": role, "changed": granted }),
            )?;
            Ok(granted)
        })?;
        info!(project = project_id, actor, target, role, changed = granted, "role granted");
        Ok(())
    }

    pub fn revoke_role(&self, project_id: &str, actor: &str, target: &str, role: &str) -> Result<()> {
        let revoked = self.transact("revoke_role", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::RBAC_MANAGE)?;
            store::require_role(ctx.conn, project_id, role)?;
            let revoked = store::revoke_role(ctx.conn, project_id, target, role)?;
            ctx.append(
                EventType::RbacRoleRevoked,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "actor_id": target, "role_id": role, "changed": revoked }),
            )?;
            Ok(revoked)
        })?;
        info!(project = project_id, actor, target, role, changed = revoked, "role revoked");
        Ok(())
    }

    /// Let holders of `role` issue attestations of `kind`.
    pub fn allow_attestation_authority(
        &self,
        project_id: &str,
        actor: &str,
        kind: &str,
        role: &str,
    ) -> Result<()> {
        require_text("attestation kind", kind)?;
        self.transact("allow_attestation_authority", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::RBAC_MANAGE)?;
            store::require_role(ctx.conn, project_id, role)?;
            let changed = store::allow_authority(ctx.conn, project_id, kind, role)?;
            ctx.append(
                EventType::RbacAttestationAllowed,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "kind": kind, "role_id": role, "changed": changed }),
            )?;
            Ok(())
        })?;
        info!(project = project_id, actor, kind, role, "attestation authority allowed");
        Ok(())
    }

    pub fn deny_attestation_authority(
        &self,
        project_id: &str,
        actor: &str,
        kind: &str,
        role: &str,
    ) -> Result<()> {
        self.transact("deny_attestation_authority", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::RBAC_MANAGE)?;
            store::require_role(ctx.conn, project_id, role)?;
            let changed = store::deny_authority(ctx.conn, project_id, kind, role)?;
            ctx.append(
                EventType::RbacAttestationDenied,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "kind": kind, "role_id": role, "changed": changed }),
            )?;
            Ok(())
        })?;
        info!(project = project_id, actor, kind, role, "attestation authority denied");
        Ok(())
    }

    /// Roles, permissions and attestable kinds of `actor` in a project.
    /// Needs no permission.
    pub fn who_am_i(&self, project_id: &str, actor: &str) -> Result<WhoAmI> {
        self.query(|conn| {
            store::get_project(conn, project_id)?;
            auth::who_am_i(conn, project_id, actor)
        })
    }
}
