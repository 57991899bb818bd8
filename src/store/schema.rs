//! Table definitions, versioned with SQLite's `user_version` pragma.

use rusqlite::Connection;

use crate::error::{ProoflineError, Result};

pub(crate) const SCHEMA_VERSION: i32 = 1;

/// Bring the database up to [`SCHEMA_VERSION`]. A database written by a
/// newer build is refused rather than guessed at.
pub(crate) fn install(conn: &Connection) -> Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(ProoflineError::Internal(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    if current < 1 {
        migrate_v0_to_v1(conn)?;
    }
    if current < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('active', 'paused', 'archived')),
            description TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS iterations (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            goal TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN (
                'pending', 'running', 'delivered', 'validated', 'rejected'
            )),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            iteration_id TEXT REFERENCES iterations(id) ON DELETE SET NULL,
            parent_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL CHECK(status IN (
                'planned', 'in_progress', 'review', 'done', 'rejected', 'canceled'
            )),
            assignee_id TEXT,
            priority INTEGER,
            work_outcomes TEXT CHECK(work_outcomes IS NULL OR json_valid(work_outcomes)),
            validation_mode TEXT NOT NULL DEFAULT 'none' CHECK(validation_mode IN (
                'none', 'all', 'any', 'threshold'
            )),
            required_kinds TEXT NOT NULL DEFAULT '[]' CHECK(json_valid(required_kinds)),
            required_threshold INTEGER CHECK(required_threshold IS NULL OR required_threshold > 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id, status);
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

        CREATE TABLE IF NOT EXISTS task_deps (
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            depends_on_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            PRIMARY KEY (task_id, depends_on_id),
            CHECK(task_id <> depends_on_id)
        );

        CREATE TABLE IF NOT EXISTS leases (
            task_id TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            owner_id TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS attestations (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            entity_kind TEXT NOT NULL CHECK(entity_kind IN (
                'project', 'task', 'iteration', 'decision'
            )),
            entity_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            ts TEXT NOT NULL,
            payload TEXT CHECK(payload IS NULL OR json_valid(payload))
        );

        CREATE INDEX IF NOT EXISTS idx_attestations_entity
        ON attestations(entity_kind, entity_id, kind);

        CREATE TABLE IF NOT EXISTS decisions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            decision TEXT NOT NULL,
            context TEXT CHECK(context IS NULL OR json_valid(context)),
            rationale TEXT CHECK(rationale IS NULL OR json_valid(rationale)),
            alternatives TEXT CHECK(alternatives IS NULL OR json_valid(alternatives)),
            decider_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- No foreign key to projects: the audit trail outlives the project.
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            type TEXT NOT NULL,
            project_id TEXT,
            entity_kind TEXT NOT NULL,
            entity_id TEXT,
            actor_id TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}' CHECK(json_valid(payload))
        );

        CREATE INDEX IF NOT EXISTS idx_events_project ON events(project_id, id);

        CREATE TABLE IF NOT EXISTS actors (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS permissions (
            id TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS roles (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            id TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (project_id, id)
        );

        CREATE TABLE IF NOT EXISTS role_permissions (
            project_id TEXT NOT NULL,
            role_id TEXT NOT NULL,
            permission_id TEXT NOT NULL REFERENCES permissions(id),
            PRIMARY KEY (project_id, role_id, permission_id),
            FOREIGN KEY (project_id, role_id) REFERENCES roles(project_id, id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS actor_roles (
            project_id TEXT NOT NULL,
            actor_id TEXT NOT NULL REFERENCES actors(id),
            role_id TEXT NOT NULL,
            PRIMARY KEY (project_id, actor_id, role_id),
            FOREIGN KEY (project_id, role_id) REFERENCES roles(project_id, id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS attestation_authorities (
            project_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            role_id TEXT NOT NULL,
            PRIMARY KEY (project_id, kind, role_id),
            FOREIGN KEY (project_id, role_id) REFERENCES roles(project_id, id) ON DELETE CASCADE
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_sets_version_and_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        install(&conn).unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = install(&conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn self_dependency_is_rejected_by_the_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        install(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO projects VALUES ('p', 'o', 'active', NULL, '2024-01-01T00:00:00Z');
             INSERT INTO tasks(id, project_id, type, title, status, created_at, updated_at)
             VALUES ('t', 'p', 'bug', 'x', 'planned', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .unwrap();
        assert!(
            conn.execute("INSERT INTO task_deps VALUES ('t', 't')", [])
                .is_err()
        );
    }
}
