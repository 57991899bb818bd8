use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::{json_column, to_json_text};
use crate::error::{ProoflineError, Result};
use crate::model::{EntityKind, Task};
use crate::policy::Policy;
use crate::state_machine::TaskStatus;

const TASK_COLUMNS: &str = "id, project_id, iteration_id, parent_id, type, title, description, \
     status, assignee_id, priority, work_outcomes, validation_mode, required_kinds, \
     required_threshold, created_at, updated_at, completed_at";

/// Narrowing criteria for [`list_tasks`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub iteration_id: Option<String>,
    pub parent_id: Option<String>,
    pub assignee_id: Option<String>,
    pub task_type: Option<String>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }
}

// Dependencies are filled in by the caller; they live in `task_deps`.
fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let threshold: Option<i64> = row.get(13)?;
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        iteration_id: row.get(2)?,
        parent_id: row.get(3)?,
        task_type: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        status: row.get(7)?,
        assignee_id: row.get(8)?,
        priority: row.get(9)?,
        work_outcomes: json_column(row, 10)?,
        policy: Policy {
            mode: row.get(11)?,
            require: json_column(row, 12)?.unwrap_or_default(),
            threshold: threshold.and_then(|t| u32::try_from(t).ok()),
        },
        depends_on: Vec::new(),
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}

pub(crate) fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks(id, project_id, iteration_id, parent_id, type, title, description, \
         status, assignee_id, priority, work_outcomes, validation_mode, required_kinds, \
         required_threshold, created_at, updated_at, completed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            task.id,
            task.project_id,
            task.iteration_id,
            task.parent_id,
            task.task_type,
            task.title,
            task.description,
            task.status,
            task.assignee_id,
            task.priority,
            to_json_text(task.work_outcomes.as_ref())?,
            task.policy.mode,
            serde_json::to_string(&task.policy.require)?,
            task.policy.threshold,
            task.created_at,
            task.updated_at,
            task.completed_at,
        ],
    )?;
    add_dependencies(conn, &task.id, &task.depends_on)
}

/// Write back every mutable column. Dependencies are edited separately.
pub(crate) fn update_task(conn: &Connection, task: &Task) -> Result<()> {
    let changed = conn.execute(
        "UPDATE tasks SET iteration_id = ?2, parent_id = ?3, title = ?4, description = ?5, \
         status = ?6, assignee_id = ?7, priority = ?8, work_outcomes = ?9, \
         validation_mode = ?10, required_kinds = ?11, required_threshold = ?12, \
         updated_at = ?13, completed_at = ?14 WHERE id = ?1",
        params![
            task.id,
            task.iteration_id,
            task.parent_id,
            task.title,
            task.description,
            task.status,
            task.assignee_id,
            task.priority,
            to_json_text(task.work_outcomes.as_ref())?,
            task.policy.mode,
            serde_json::to_string(&task.policy.require)?,
            task.policy.threshold,
            task.updated_at,
            task.completed_at,
        ],
    )?;
    if changed == 0 {
        return Err(ProoflineError::not_found(EntityKind::Task, &task.id));
    }
    Ok(())
}

pub(crate) fn find_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let Some(mut task) = conn.query_row(&sql, [id], task_from_row).optional()? else {
        return Ok(None);
    };
    task.depends_on = task_dependencies(conn, id)?;
    Ok(Some(task))
}

pub(crate) fn get_task(conn: &Connection, id: &str) -> Result<Task> {
    find_task(conn, id)?.ok_or_else(|| ProoflineError::not_found(EntityKind::Task, id))
}

pub(crate) fn list_tasks(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    let mut push = |column: &str, value: Value| {
        args.push(value);
        clauses.push(format!("{column} = ?{}", args.len()));
    };
    if let Some(project_id) = &filter.project_id {
        push("project_id", Value::Text(project_id.clone()));
    }
    if let Some(status) = filter.status {
        push("status", Value::Text(status.as_str().to_string()));
    }
    if let Some(iteration_id) = &filter.iteration_id {
        push("iteration_id", Value::Text(iteration_id.clone()));
    }
    if let Some(parent_id) = &filter.parent_id {
        push("parent_id", Value::Text(parent_id.clone()));
    }
    if let Some(assignee_id) = &filter.assignee_id {
        push("assignee_id", Value::Text(assignee_id.clone()));
    }
    if let Some(task_type) = &filter.task_type {
        push("type", Value::Text(task_type.clone()));
    }

    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at, rowid");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut tasks = stmt
        .query_map(params_from_iter(args), task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for task in &mut tasks {
        task.depends_on = task_dependencies(conn, &task.id)?;
    }
    Ok(tasks)
}

pub(crate) fn task_dependencies(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT depends_on_id FROM task_deps WHERE task_id = ?1 ORDER BY depends_on_id",
    )?;
    let ids = stmt.query_map([task_id], |row| row.get(0))?;
    Ok(ids.collect::<rusqlite::Result<Vec<String>>>()?)
}

pub(crate) fn add_dependencies(conn: &Connection, task_id: &str, deps: &[String]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO task_deps(task_id, depends_on_id) VALUES (?1, ?2)")?;
    for dep in deps {
        stmt.execute(params![task_id, dep])?;
    }
    Ok(())
}

pub(crate) fn remove_dependencies(conn: &Connection, task_id: &str, deps: &[String]) -> Result<()> {
    let mut stmt = conn.prepare("DELETE FROM task_deps WHERE task_id = ?1 AND depends_on_id = ?2")?;
    for dep in deps {
        stmt.execute(params![task_id, dep])?;
    }
    Ok(())
}

/// Direct children, computed from the `parent_id` column.
pub(crate) fn child_ids(conn: &Connection, task_id: &str) -> Result<Vec<(String, TaskStatus)>> {
    let mut stmt =
        conn.prepare("SELECT id, status FROM tasks WHERE parent_id = ?1 ORDER BY created_at, rowid")?;
    let rows = stmt.query_map([task_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn parent_of(conn: &Connection, task_id: &str) -> Result<Option<Option<String>>> {
    Ok(conn
        .query_row("SELECT parent_id FROM tasks WHERE id = ?1", [task_id], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Project and status of a task, without loading the whole row.
pub(crate) fn task_header(conn: &Connection, task_id: &str) -> Result<Option<(String, TaskStatus)>> {
    Ok(conn
        .query_row(
            "SELECT project_id, status FROM tasks WHERE id = ?1",
            [task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}
