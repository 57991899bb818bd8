use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::config::RoleConfig;
use crate::error::{ProoflineError, Result};
use crate::model::EntityKind;

pub(crate) fn ensure_actor(conn: &Connection, actor_id: &str, now: DateTime<Utc>) -> Result<()> {
    if actor_id.trim().is_empty() {
        return Err(ProoflineError::validation("actor id is required"));
    }
    conn.execute(
        "INSERT OR IGNORE INTO actors(id, created_at) VALUES (?1, ?2)",
        params![actor_id, now],
    )?;
    Ok(())
}

/// Install one configured role for a project: the role row, its
/// permissions and the attestation kinds it may issue.
pub(crate) fn seed_role(
    conn: &Connection,
    project_id: &str,
    role_id: &str,
    role: &RoleConfig,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO roles(project_id, id, description) VALUES (?1, ?2, ?3)",
        params![project_id, role_id, role.description],
    )?;
    for permission in &role.permissions {
        conn.execute(
            "INSERT OR IGNORE INTO permissions(id) VALUES (?1)",
            [permission],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO role_permissions(project_id, role_id, permission_id) VALUES (?1, ?2, ?3)",
            params![project_id, role_id, permission],
        )?;
    }
    for kind in &role.can_attest {
        allow_authority(conn, project_id, kind, role_id)?;
    }
    Ok(())
}

pub(crate) fn role_exists(conn: &Connection, project_id: &str, role_id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM roles WHERE project_id = ?1 AND id = ?2)",
        params![project_id, role_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn require_role(conn: &Connection, project_id: &str, role_id: &str) -> Result<()> {
    if role_exists(conn, project_id, role_id)? {
        Ok(())
    } else {
        Err(ProoflineError::not_found(EntityKind::Role, role_id))
    }
}

/// Returns `false` when the actor already held the role.
pub(crate) fn assign_role(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
    role_id: &str,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO actor_roles(project_id, actor_id, role_id) VALUES (?1, ?2, ?3)",
        params![project_id, actor_id, role_id],
    )?;
    Ok(inserted > 0)
}

/// Returns `false` when the actor did not hold the role.
pub(crate) fn revoke_role(
    conn: &Connection,
    project_id: &str,
    actor_id: &str,
    role_id: &str,
) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM actor_roles WHERE project_id = ?1 AND actor_id = ?2 AND role_id = ?3",
        params![project_id, actor_id, role_id],
    )?;
    Ok(removed > 0)
}

pub(crate) fn allow_authority(
    conn: &Connection,
    project_id: &str,
    kind: &str,
    role_id: &str,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO attestation_authorities(project_id, kind, role_id) VALUES (?1, ?2, ?3)",
        params![project_id, kind, role_id],
    )?;
    Ok(inserted > 0)
}

pub(crate) fn deny_authority(
    conn: &Connection,
    project_id: &str,
    kind: &str,
    role_id: &str,
) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM attestation_authorities WHERE project_id = ?1 AND kind = ?2 AND role_id = ?3",
        params![project_id, kind, role_id],
    )?;
    Ok(removed > 0)
}
