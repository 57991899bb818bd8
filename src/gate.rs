//! Structural prerequisites: dependency completion, sub-task completion and
//! cycle-freedom of both the parent tree and the dependency graph.
//!
//! Every check reads through the caller's connection, which during an
//! engine operation is the open write transaction.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::error::{GateError, ProoflineError, Result};
use crate::model::EntityKind;
use crate::state_machine::TaskStatus;
use crate::store;

/// Reject placing `task_id` under `parent_id` when the parent's ancestor
/// chain already contains `task_id`.
pub(crate) fn ensure_no_hierarchy_cycle(
    conn: &Connection,
    task_id: &str,
    parent_id: &str,
) -> Result<()> {
    let cycle = || GateError::HierarchyCycle {
        task_id: task_id.to_string(),
        parent_id: parent_id.to_string(),
    };
    let mut seen = HashSet::new();
    let mut current = Some(parent_id.to_string());
    while let Some(id) = current {
        if id == task_id || !seen.insert(id.clone()) {
            return Err(cycle().into());
        }
        current = store::parent_of(conn, &id)?.flatten();
    }
    Ok(())
}

/// Check a proposed parent: it must exist, share the project and not
/// close a loop.
pub(crate) fn ensure_parent(
    conn: &Connection,
    project_id: &str,
    task_id: &str,
    parent_id: &str,
) -> Result<()> {
    let (parent_project, _) = store::task_header(conn, parent_id)?
        .ok_or_else(|| ProoflineError::not_found(EntityKind::Task, parent_id))?;
    if parent_project != project_id {
        return Err(ProoflineError::validation(format!(
            "parent {parent_id} is not in project {project_id}"
        )));
    }
    ensure_no_hierarchy_cycle(conn, task_id, parent_id)
}

/// Check new dependency edges `task_id -> dep`: each target must exist in
/// the same project and must not already reach `task_id`.
pub(crate) fn ensure_dependencies_valid(
    conn: &Connection,
    project_id: &str,
    task_id: &str,
    deps: &[String],
) -> Result<()> {
    for dep in deps {
        let (dep_project, _) = store::task_header(conn, dep)?
            .ok_or_else(|| ProoflineError::not_found(EntityKind::Task, dep))?;
        if dep_project != project_id {
            return Err(GateError::DependencyOutsideProject {
                task_id: dep.clone(),
                project_id: project_id.to_string(),
            }
            .into());
        }
        if dep == task_id || reaches(conn, dep, task_id)? {
            return Err(GateError::DependencyCycle {
                task_id: task_id.to_string(),
                depends_on: dep.clone(),
            }
            .into());
        }
    }
    Ok(())
}

// Depth-first walk of dependency edges from `from`, looking for `target`.
fn reaches(conn: &Connection, from: &str, target: &str) -> Result<bool> {
    let mut stack = vec![from.to_string()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == target {
            return Ok(true);
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        stack.extend(store::task_dependencies(conn, &id)?);
    }
    Ok(false)
}

/// Every explicit dependency of `task_id` must be `done`.
pub(crate) fn ensure_dependencies_done(
    conn: &Connection,
    project_id: &str,
    task_id: &str,
) -> Result<()> {
    for dep in store::task_dependencies(conn, task_id)? {
        let (dep_project, status) = store::task_header(conn, &dep)?
            .ok_or_else(|| ProoflineError::not_found(EntityKind::Task, &dep))?;
        if dep_project != project_id {
            return Err(GateError::DependencyOutsideProject {
                task_id: dep,
                project_id: project_id.to_string(),
            }
            .into());
        }
        if status != TaskStatus::Done {
            return Err(GateError::DependencyNotDone { task_id: dep }.into());
        }
    }
    Ok(())
}

/// Every direct and transitive child of `task_id` must be `done`.
pub(crate) fn ensure_subtasks_done(conn: &Connection, task_id: &str) -> Result<()> {
    let mut stack = vec![task_id.to_string()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        for (child, status) in store::child_ids(conn, &id)? {
            if status != TaskStatus::Done {
                return Err(GateError::SubtaskNotDone { task_id: child }.into());
            }
            stack.push(child);
        }
    }
    Ok(())
}
