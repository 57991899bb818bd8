use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{ProoflineError, Result};
use crate::model::{EntityKind, Iteration};
use crate::state_machine::IterationStatus;

const ITERATION_COLUMNS: &str = "id, project_id, goal, status, created_at";

fn iteration_from_row(row: &Row<'_>) -> rusqlite::Result<Iteration> {
    Ok(Iteration {
        id: row.get(0)?,
        project_id: row.get(1)?,
        goal: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn insert_iteration(conn: &Connection, iteration: &Iteration) -> Result<()> {
    conn.execute(
        "INSERT INTO iterations(id, project_id, goal, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            iteration.id,
            iteration.project_id,
            iteration.goal,
            iteration.status,
            iteration.created_at
        ],
    )?;
    Ok(())
}

pub(crate) fn find_iteration(conn: &Connection, id: &str) -> Result<Option<Iteration>> {
    let sql = format!("SELECT {ITERATION_COLUMNS} FROM iterations WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], iteration_from_row).optional()?)
}

pub(crate) fn get_iteration(conn: &Connection, id: &str) -> Result<Iteration> {
    find_iteration(conn, id)?.ok_or_else(|| ProoflineError::not_found(EntityKind::Iteration, id))
}

pub(crate) fn list_iterations(conn: &Connection, project_id: &str) -> Result<Vec<Iteration>> {
    let sql = format!(
        "SELECT {ITERATION_COLUMNS} FROM iterations WHERE project_id = ?1 ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([project_id], iteration_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn set_iteration_status(
    conn: &Connection,
    id: &str,
    status: IterationStatus,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE iterations SET status = ?2 WHERE id = ?1",
        params![id, status],
    )?;
    if changed == 0 {
        return Err(ProoflineError::not_found(EntityKind::Iteration, id));
    }
    Ok(())
}
