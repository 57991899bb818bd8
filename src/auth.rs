//! Role-based authorization.
//!
//! An actor's permissions in a project are the union of the permissions of
//! every role they hold there; attestation authority works the same way over
//! attestation kinds. Roles are flat sets, there is no inheritance.

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Permission names checked by the engine.
pub mod permissions {
    pub const PROJECT_UPDATE: &str = "project.update";
    pub const PROJECT_DELETE: &str = "project.delete";
    pub const TASK_CREATE: &str = "task.create";
    pub const TASK_UPDATE: &str = "task.update";
    pub const TASK_DONE: &str = "task.done";
    pub const TASK_CLAIM: &str = "task.claim";
    pub const TASK_RELEASE: &str = "task.release";
    pub const ITERATION_CREATE: &str = "iteration.create";
    pub const ITERATION_SET_STATUS: &str = "iteration.set_status";
    pub const DECISION_CREATE: &str = "decision.create";
    pub const ATTESTATION_ADD: &str = "attestation.add";
    pub const RBAC_MANAGE: &str = "rbac.manage";
    pub const FORCE_USE: &str = "force.use";
}

use permissions::*;

pub const ALL_PERMISSIONS: &[&str] = &[
    PROJECT_UPDATE,
    PROJECT_DELETE,
    TASK_CREATE,
    TASK_UPDATE,
    TASK_DONE,
    TASK_CLAIM,
    TASK_RELEASE,
    ITERATION_CREATE,
    ITERATION_SET_STATUS,
    DECISION_CREATE,
    ATTESTATION_ADD,
    RBAC_MANAGE,
    FORCE_USE,
];

/// What an actor may do in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub actor_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub attestation_kinds: Vec<String>,
}

pub(crate) fn has_permission(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
    permission: &str,
) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM actor_roles ar
            JOIN role_permissions rp ON rp.project_id = ar.project_id AND rp.role_id = ar.role_id
            WHERE ar.project_id = ?1 AND ar.actor_id = ?2 AND rp.permission_id = ?3
        )",
        params![project_id, actor_id, permission],
        |row| row.get(0),
    )?)
}

pub(crate) fn can_attest(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
    kind: &str,
) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM actor_roles ar
            JOIN attestation_authorities aa ON aa.project_id = ar.project_id AND aa.role_id = ar.role_id
            WHERE ar.project_id = ?1 AND ar.actor_id = ?2 AND aa.kind = ?3
        )",
        params![project_id, actor_id, kind],
        |row| row.get(0),
    )?)
}

fn strings(conn: &Connection, sql: &str, project_id: &str, actor_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![project_id, actor_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

pub(crate) fn actor_roles(conn: &Connection, project_id: &str, actor_id: &str) -> Result<Vec<String>> {
    strings(
        conn,
        "SELECT role_id FROM actor_roles WHERE project_id = ?1 AND actor_id = ?2 ORDER BY role_id",
        project_id,
        actor_id,
    )
}

pub(crate) fn actor_permissions(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
) -> Result<Vec<String>> {
    strings(
        conn,
        "SELECT DISTINCT rp.permission_id FROM actor_roles ar
         JOIN role_permissions rp ON rp.project_id = ar.project_id AND rp.role_id = ar.role_id
         WHERE ar.project_id = ?1 AND ar.actor_id = ?2 ORDER BY rp.permission_id",
        project_id,
        actor_id,
    )
}

pub(crate) fn actor_attestation_kinds(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
) -> Result<Vec<String>> {
    strings(
        conn,
        "SELECT DISTINCT aa.kind FROM actor_roles ar
         JOIN attestation_authorities aa ON aa.project_id = ar.project_id AND aa.role_id = ar.role_id
         WHERE ar.project_id = ?1 AND ar.actor_id = ?2 ORDER BY aa.kind",
        project_id,
        actor_id,
    )
}

pub(crate) fn who_am_i(conn: &Connection, project_id: &str, actor_id: &str) -> Result<WhoAmI> {
    Ok(WhoAmI {
        actor_id: actor_id.to_string(),
        roles: actor_roles(conn, project_id, actor_id)?,
        permissions: actor_permissions(conn, project_id, actor_id)?,
        attestation_kinds: actor_attestation_kinds(conn, project_id, actor_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleConfig;
    use crate::store::{self, Store};
    use chrono::Utc;

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO projects VALUES ('p', 'o', 'active', NULL, '2024-01-01T00:00:00Z')",
                    [],
                )?;
                let dev = RoleConfig {
                    description: "Developer".into(),
                    permissions: vec![TASK_CLAIM.into(), TASK_UPDATE.into()],
                    can_attest: vec!["ci.passed".into()],
                };
                let reviewer = RoleConfig {
                    description: "Reviewer".into(),
                    permissions: vec![ATTESTATION_ADD.into(), TASK_UPDATE.into()],
                    can_attest: vec!["review.approved".into()],
                };
                store::seed_role(tx, "p", "dev", &dev)?;
                store::seed_role(tx, "p", "reviewer", &reviewer)?;
                store::ensure_actor(tx, "alice", Utc::now())?;
                store::assign_role(tx, "p", "alice", "dev")?;
                store::assign_role(tx, "p", "alice", "reviewer")?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn permissions_are_the_union_of_roles() {
        let store = seeded();
        store
            .read(|tx| {
                assert!(has_permission(tx, "p", "alice", TASK_CLAIM)?);
                assert!(has_permission(tx, "p", "alice", ATTESTATION_ADD)?);
                assert!(!has_permission(tx, "p", "alice", RBAC_MANAGE)?);
                assert!(!has_permission(tx, "other", "alice", TASK_CLAIM)?);
                assert_eq!(
                    actor_permissions(tx, "p", "alice")?,
                    vec![ATTESTATION_ADD, TASK_CLAIM, TASK_UPDATE]
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn attestation_authority_follows_roles() {
        let store = seeded();
        let me = store.read(|tx| who_am_i(tx, "p", "alice")).unwrap();
        assert_eq!(me.roles, vec!["dev", "reviewer"]);
        assert_eq!(me.attestation_kinds, vec!["ci.passed", "review.approved"]);
        let nobody = store.read(|tx| who_am_i(tx, "p", "bob")).unwrap();
        assert!(nobody.roles.is_empty());
        assert!(nobody.permissions.is_empty());
        assert!(!store.read(|tx| can_attest(tx, "p", "bob", "ci.passed")).unwrap());
    }

    #[test]
    fn catalog_has_no_duplicates() {
        let mut sorted = ALL_PERMISSIONS.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ALL_PERMISSIONS.len());
    }
}
