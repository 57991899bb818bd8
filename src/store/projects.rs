use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{ProoflineError, Result};
use crate::model::{EntityKind, Project};

const PROJECT_COLUMNS: &str = "id, org_id, status, description, created_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        org_id: row.get(1)?,
        status: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects(id, org_id, status, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project.id,
            project.org_id,
            project.status,
            project.description,
            project.created_at
        ],
    )?;
    Ok(())
}

pub(crate) fn find_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], project_from_row).optional()?)
}

pub(crate) fn get_project(conn: &Connection, id: &str) -> Result<Project> {
    find_project(conn, id)?.ok_or_else(|| ProoflineError::not_found(EntityKind::Project, id))
}

pub(crate) fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], project_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn update_project(conn: &Connection, project: &Project) -> Result<()> {
    let changed = conn.execute(
        "UPDATE projects SET status = ?2, description = ?3 WHERE id = ?1",
        params![project.id, project.status, project.description],
    )?;
    if changed == 0 {
        return Err(ProoflineError::not_found(EntityKind::Project, &project.id));
    }
    Ok(())
}

/// Remove a project; every child row goes with it through `ON DELETE CASCADE`.
pub(crate) fn delete_project(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(ProoflineError::not_found(EntityKind::Project, id));
    }
    Ok(())
}
