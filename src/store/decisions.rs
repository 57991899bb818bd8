use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{json_column, to_json_text};
use crate::error::{ProoflineError, Result};
use crate::model::{Decision, EntityKind};

const DECISION_COLUMNS: &str =
    "id, project_id, title, decision, context, rationale, alternatives, decider_id, created_at";

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        decision: row.get(3)?,
        context: json_column(row, 4)?,
        rationale: json_column(row, 5)?,
        alternatives: json_column(row, 6)?,
        decider_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub(crate) fn insert_decision(conn: &Connection, decision: &Decision) -> Result<()> {
    conn.execute(
        "INSERT INTO decisions(id, project_id, title, decision, context, rationale, alternatives, \
         decider_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            decision.id,
            decision.project_id,
            decision.title,
            decision.decision,
            to_json_text(decision.context.as_ref())?,
            to_json_text(decision.rationale.as_ref())?,
            to_json_text(decision.alternatives.as_ref())?,
            decision.decider_id,
            decision.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn find_decision(conn: &Connection, id: &str) -> Result<Option<Decision>> {
    let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], decision_from_row).optional()?)
}

pub(crate) fn get_decision(conn: &Connection, id: &str) -> Result<Decision> {
    find_decision(conn, id)?.ok_or_else(|| ProoflineError::not_found(EntityKind::Decision, id))
}

pub(crate) fn list_decisions(conn: &Connection, project_id: &str) -> Result<Vec<Decision>> {
    let sql = format!(
        "SELECT {DECISION_COLUMNS} FROM decisions WHERE project_id = ?1 ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([project_id], decision_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
