//! SQLite persistence for projects, tasks, iterations, leases, attestations,
//! decisions and RBAC grants.
//!
//! The row helpers in the submodules take a plain `&Connection`; callers
//! pass the open [`Transaction`] (which derefs to a connection) so that
//! every read a gate depends on happens inside the same transaction as the
//! write that follows it.

mod attestations;
mod decisions;
mod iterations;
mod leases;
mod projects;
mod rbac;
mod schema;
mod tasks;

pub(crate) use attestations::*;
pub(crate) use decisions::*;
pub(crate) use iterations::*;
pub(crate) use leases::*;
pub(crate) use projects::*;
pub(crate) use rbac::*;
pub(crate) use tasks::*;

pub use attestations::AttestationFilter;
pub use tasks::TaskFilter;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ProoflineError, Result};
use crate::model::{EntityKind, ProjectStatus};
use crate::policy::ValidationMode;
use crate::state_machine::{IterationStatus, TaskStatus};

/// File name of the database inside a workspace's state directory.
pub const DB_FILE: &str = "proofline.db";

/// One SQLite database holding every project of a workspace.
///
/// `rusqlite::Connection` is not `Sync`; the mutex serializes operations
/// issued from different threads of one process. Separate processes are
/// serialized by SQLite itself because every write transaction starts with
/// `BEGIN IMMEDIATE`.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            // Some filesystems cannot host the WAL index; SQLite then keeps its old mode.
            warn!(path = %path.display(), journal_mode = %journal_mode, "WAL journaling unavailable");
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Self::init(conn, Some(path))
    }

    /// An in-memory database, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::install(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ProoflineError::Internal("connection mutex poisoned".into()))
    }

    /// Run `f` inside a write transaction that holds SQLite's write lock
    /// from its first statement. The transaction commits only if `f`
    /// returns `Ok`; any error rolls it back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a read-only snapshot. Nothing is committed.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        f(&tx)
    }
}

/// Decode a JSON text column into `T`.
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

pub(crate) fn to_json_text<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

/// Persist enums as their canonical lower-case names so the `CHECK`
/// constraints in the schema apply to them.
macro_rules! sql_text_enum {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: ProoflineError| FromSqlError::Other(Box::new(e)))
                }
            }
        )*
    };
}

sql_text_enum!(
    TaskStatus,
    IterationStatus,
    ProjectStatus,
    EntityKind,
    ValidationMode,
);
