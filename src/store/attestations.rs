use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use super::{json_column, to_json_text};
use crate::error::Result;
use crate::model::{Attestation, EntityKind};

/// Narrowing criteria for [`list_attestations`]. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestationFilter {
    pub project_id: Option<String>,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

impl AttestationFilter {
    pub fn entity(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity_kind: Some(kind),
            entity_id: Some(id.into()),
            ..Self::default()
        }
    }
}

fn attestation_from_row(row: &Row<'_>) -> rusqlite::Result<Attestation> {
    Ok(Attestation {
        id: row.get(0)?,
        project_id: row.get(1)?,
        entity_kind: row.get(2)?,
        entity_id: row.get(3)?,
        kind: row.get(4)?,
        actor_id: row.get(5)?,
        ts: row.get(6)?,
        payload: json_column(row, 7)?,
    })
}

pub(crate) fn insert_attestation(conn: &Connection, att: &Attestation) -> Result<()> {
    conn.execute(
        "INSERT INTO attestations(id, project_id, entity_kind, entity_id, kind, actor_id, ts, payload) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            att.id,
            att.project_id,
            att.entity_kind,
            att.entity_id,
            att.kind,
            att.actor_id,
            att.ts,
            to_json_text(att.payload.as_ref())?,
        ],
    )?;
    Ok(())
}

pub(crate) fn list_attestations(
    conn: &Connection,
    filter: &AttestationFilter,
) -> Result<Vec<Attestation>> {
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    let mut push = |column: &str, value: String| {
        args.push(Value::Text(value));
        clauses.push(format!("{column} = ?{}", args.len()));
    };
    if let Some(project_id) = &filter.project_id {
        push("project_id", project_id.clone());
    }
    if let Some(entity_kind) = filter.entity_kind {
        push("entity_kind", entity_kind.as_str().to_string());
    }
    if let Some(entity_id) = &filter.entity_id {
        push("entity_id", entity_id.clone());
    }
    if let Some(kind) = &filter.kind {
        push("kind", kind.clone());
    }

    let mut sql = String::from(
        "SELECT id, project_id, entity_kind, entity_id, kind, actor_id, ts, payload FROM attestations",
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ts DESC, rowid DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), attestation_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Distinct attestation kinds recorded against one entity.
pub(crate) fn attestation_kinds(
    conn: &Connection,
    entity_kind: EntityKind,
    entity_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT kind FROM attestations WHERE entity_kind = ?1 AND entity_id = ?2 ORDER BY kind",
    )?;
    let rows = stmt.query_map(params![entity_kind, entity_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

pub(crate) fn has_attestation(
    conn: &Connection,
    entity_kind: EntityKind,
    entity_id: &str,
    kind: &str,
) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM attestations WHERE entity_kind = ?1 AND entity_id = ?2 AND kind = ?3)",
        params![entity_kind, entity_id, kind],
        |row| row.get(0),
    )?)
}
