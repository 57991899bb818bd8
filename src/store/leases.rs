use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::model::Lease;

pub(crate) fn find_lease(conn: &Connection, task_id: &str) -> Result<Option<Lease>> {
    Ok(conn
        .query_row(
            "SELECT task_id, owner_id, acquired_at, expires_at FROM leases WHERE task_id = ?1",
            [task_id],
            |row| {
                Ok(Lease {
                    task_id: row.get(0)?,
                    owner_id: row.get(1)?,
                    acquired_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()?)
}

/// Write the lease row, replacing whatever held the task before.
pub(crate) fn upsert_lease(conn: &Connection, project_id: &str, lease: &Lease) -> Result<()> {
    conn.execute(
        "INSERT INTO leases(task_id, project_id, owner_id, acquired_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(task_id) DO UPDATE SET owner_id = excluded.owner_id, \
         acquired_at = excluded.acquired_at, expires_at = excluded.expires_at",
        params![
            lease.task_id,
            project_id,
            lease.owner_id,
            lease.acquired_at,
            lease.expires_at
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_lease(conn: &Connection, task_id: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM leases WHERE task_id = ?1", [task_id])? > 0)
}
