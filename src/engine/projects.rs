use serde_json::json;
use tracing::info;

use super::{DEFAULT_ORG_ID, Engine, require_text};
use crate::auth::permissions;
use crate::error::{ProoflineError, Result};
use crate::events::EventType;
use crate::model::{EntityKind, Project, ProjectStatus};
use crate::store;

impl Engine {
    /// Create a project, seed its roles from configuration and make `actor`
    /// its owner. Bootstrapping needs no permission.
    pub fn init_project(
        &self,
        project_id: &str,
        description: Option<&str>,
        actor: &str,
    ) -> Result<Project> {
        require_text("project id", project_id)?;
        let project = self.transact("init_project", actor, |ctx| {
            if store::find_project(ctx.conn, project_id)?.is_some() {
                return Err(ProoflineError::validation(format!(
                    "project {project_id} already exists"
                )));
            }
            let project = Project {
                id: project_id.to_string(),
                org_id: DEFAULT_ORG_ID.to_string(),
                status: ProjectStatus::Active,
                description: description.map(str::to_string),
                created_at: ctx.now,
            };
            store::insert_project(ctx.conn, &project)?;
            ctx.append(
                EventType::ProjectInit,
                project_id,
                EntityKind::Project,
                project_id,
                json!({ "status": project.status }),
            )?;

            for (role_id, role) in &ctx.config.rbac.roles {
                store::seed_role(ctx.conn, project_id, role_id, role)?;
            }
            ctx.append(
                EventType::RbacSeeded,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "roles": ctx.config.rbac.roles.keys().collect::<Vec<_>>() }),
            )?;

            store::assign_role(ctx.conn, project_id, ctx.actor, "owner")?;
            ctx.append(
                EventType::RbacRoleGranted,
                project_id,
                EntityKind::Rbac,
                project_id,
                json!({ "actor_id": ctx.actor, "role_id": "owner" }),
            )?;
            Ok(project)
        })?;
        info!(project = project_id, actor, "project initialized");
        Ok(project)
    }

    pub fn update_project(
        &self,
        project_id: &str,
        actor: &str,
        status: Option<ProjectStatus>,
        description: Option<&str>,
    ) -> Result<Project> {
        let project = self.transact("update_project", actor, |ctx| {
            let mut project = store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::PROJECT_UPDATE)?;
            let from = project.status;
            if let Some(status) = status {
                project.status = status;
            }
            if let Some(description) = description {
                project.description = Some(description.to_string()).filter(|d| !d.is_empty());
            }
            store::update_project(ctx.conn, &project)?;
            ctx.append(
                EventType::ProjectUpdated,
                project_id,
                EntityKind::Project,
                project_id,
                json!({ "from_status": from, "to_status": project.status }),
            )?;
            Ok(project)
        })?;
        info!(project = project_id, actor, status = %project.status, "project updated");
        Ok(project)
    }

    /// Delete a project and every row that belongs to it. Its events stay.
    pub fn delete_project(&self, project_id: &str, actor: &str) -> Result<()> {
        self.transact("delete_project", actor, |ctx| {
            store::get_project(ctx.conn, project_id)?;
            ctx.require(project_id, permissions::PROJECT_DELETE)?;
            store::delete_project(ctx.conn, project_id)?;
            ctx.append(
                EventType::ProjectDeleted,
                project_id,
                EntityKind::Project,
                project_id,
                json!({}),
            )?;
            Ok(())
        })?;
        info!(project = project_id, actor, "project deleted");
        Ok(())
    }
}
