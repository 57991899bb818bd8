//! Append-only audit log.
//!
//! Events are written through the same transaction as the mutation they
//! describe, so a rolled-back operation leaves no event behind. Ids are
//! strictly increasing; consumers page forward with [`events_after`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::{ProoflineError, Result};
use crate::model::{EntityKind, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ProjectInit,
    ProjectUpdated,
    ProjectDeleted,
    TaskCreated,
    TaskPolicyApplied,
    PolicyOverride,
    TaskPolicyUpdated,
    TaskUpdated,
    TaskDone,
    LeaseClaimed,
    LeaseReleased,
    IterationCreated,
    IterationUpdated,
    IterationValidationChecked,
    DecisionCreated,
    AttestationAdded,
    RbacSeeded,
    RbacRoleGranted,
    RbacRoleRevoked,
    RbacAttestationAllowed,
    RbacAttestationDenied,
    AuthDenied,
    ForceUsed,
}

impl EventType {
    pub const ALL: &'static [EventType] = &[
        EventType::ProjectInit,
        EventType::ProjectUpdated,
        EventType::ProjectDeleted,
        EventType::TaskCreated,
        EventType::TaskPolicyApplied,
        EventType::PolicyOverride,
        EventType::TaskPolicyUpdated,
        EventType::TaskUpdated,
        EventType::TaskDone,
        EventType::LeaseClaimed,
        EventType::LeaseReleased,
        EventType::IterationCreated,
        EventType::IterationUpdated,
        EventType::IterationValidationChecked,
        EventType::DecisionCreated,
        EventType::AttestationAdded,
        EventType::RbacSeeded,
        EventType::RbacRoleGranted,
        EventType::RbacRoleRevoked,
        EventType::RbacAttestationAllowed,
        EventType::RbacAttestationDenied,
        EventType::AuthDenied,
        EventType::ForceUsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProjectInit => "project.init",
            EventType::ProjectUpdated => "project.updated",
            EventType::ProjectDeleted => "project.deleted",
            EventType::TaskCreated => "task.created",
            EventType::TaskPolicyApplied => "task.policy.applied",
            EventType::PolicyOverride => "policy.override",
            EventType::TaskPolicyUpdated => "task.policy.updated",
            EventType::TaskUpdated => "task.updated",
            EventType::TaskDone => "task.done",
            EventType::LeaseClaimed => "lease.claimed",
            EventType::LeaseReleased => "lease.released",
            EventType::IterationCreated => "iteration.created",
            EventType::IterationUpdated => "iteration.updated",
            EventType::IterationValidationChecked => "iteration.validation.checked",
            EventType::DecisionCreated => "decision.created",
            EventType::AttestationAdded => "attestation.added",
            EventType::RbacSeeded => "rbac.seeded",
            EventType::RbacRoleGranted => "rbac.role_granted",
            EventType::RbacRoleRevoked => "rbac.role_revoked",
            EventType::RbacAttestationAllowed => "rbac.attestation_allowed",
            EventType::RbacAttestationDenied => "rbac.attestation_denied",
            EventType::AuthDenied => "auth.denied",
            EventType::ForceUsed => "force.used",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProoflineError::validation(format!("unknown event type {s}")))
    }
}

/// An event about to be appended. The id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub(crate) struct NewEvent<'a> {
    pub event_type: EventType,
    pub project_id: Option<&'a str>,
    pub entity_kind: EntityKind,
    pub entity_id: Option<&'a str>,
    pub actor_id: &'a str,
    pub payload: serde_json::Value,
}

pub(crate) fn append(conn: &Connection, ts: DateTime<Utc>, event: &NewEvent<'_>) -> Result<i64> {
    let payload = if event.payload.is_null() {
        "{}".to_string()
    } else {
        serde_json::to_string(&event.payload)?
    };
    conn.execute(
        "INSERT INTO events(ts, type, project_id, entity_kind, entity_id, actor_id, payload) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            ts,
            event.event_type.as_str(),
            event.project_id,
            event.entity_kind,
            event.entity_id,
            event.actor_id,
            payload,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const EVENT_COLUMNS: &str = "id, ts, type, project_id, entity_kind, entity_id, actor_id, payload";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let payload: String = row.get(7)?;
    let payload = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Event {
        id: row.get(0)?,
        ts: row.get(1)?,
        event_type: row.get(2)?,
        project_id: row.get(3)?,
        entity_kind: row.get(4)?,
        entity_id: row.get(5)?,
        actor_id: row.get(6)?,
        payload,
    })
}

/// Events with an id greater than `cursor`, oldest first. Pass the id of
/// the last event seen to resume; `0` starts from the beginning.
pub(crate) fn events_after(
    conn: &Connection,
    project_id: Option<&str>,
    cursor: i64,
    limit: usize,
) -> Result<Vec<Event>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events \
         WHERE id > ?1 AND (?2 IS NULL OR project_id = ?2) ORDER BY id LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![cursor, project_id, limit], event_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Criteria for [`latest_events`]. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub project_id: Option<String>,
    pub event_type: Option<EventType>,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    /// Only events older than this id.
    pub before: Option<i64>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            project_id: None,
            event_type: None,
            entity_kind: None,
            entity_id: None,
            before: None,
            limit: 50,
        }
    }
}

impl EventFilter {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }
}

pub(crate) fn latest_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<Event>> {
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    let mut push = |clause: &str, value: Value| {
        args.push(value);
        clauses.push(format!("{clause} ?{}", args.len()));
    };
    if let Some(project_id) = &filter.project_id {
        push("project_id =", Value::Text(project_id.clone()));
    }
    if let Some(event_type) = filter.event_type {
        push("type =", Value::Text(event_type.as_str().to_string()));
    }
    if let Some(entity_kind) = filter.entity_kind {
        push("entity_kind =", Value::Text(entity_kind.as_str().to_string()));
    }
    if let Some(entity_id) = &filter.entity_id {
        push("entity_id =", Value::Text(entity_id.clone()));
    }
    if let Some(before) = filter.before {
        push("id <", Value::Integer(before));
    }

    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", filter.limit));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), event_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
