//! The workflow engine.
//!
//! Every public mutation runs through [`Engine::transact`]: one
//! `BEGIN IMMEDIATE` transaction in which the operation authorizes the
//! actor, checks structural and policy gates, mutates rows and appends its
//! events. Nothing is visible unless every step succeeds.

mod attestations;
mod decisions;
mod iterations;
mod leases;
mod projects;
mod queries;
mod rbac;
mod tasks;

pub use decisions::CreateDecision;
pub use tasks::{CreateTask, UpdateTask};

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::{Value, json};
use tracing::warn;

use crate::auth::{self, permissions};
use crate::clock::{Clock, SystemClock};
use crate::config::ProoflineConfig;
use crate::error::{ProoflineError, Result};
use crate::events::{self, EventType, NewEvent};
use crate::lease;
use crate::model::EntityKind;
use crate::store::{self, Store};

/// Organization every project is created under.
pub const DEFAULT_ORG_ID: &str = "default-org";

/// Directory, relative to a workspace, holding the database.
pub const STATE_DIR: &str = ".proofline";

pub struct Engine {
    store: Store,
    config: ProoflineConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(store: Store, config: ProoflineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Open the workspace at `dir`: `proofline.toml` for configuration and
    /// `.proofline/proofline.db` for state.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = ProoflineConfig::load(dir)?;
        let store = Store::open(dir.join(STATE_DIR).join(store::DB_FILE))?;
        Ok(Self::new(store, config, Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &ProoflineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `op` in one write transaction on behalf of `actor`.
    ///
    /// On error the transaction rolls back. If the error was an
    /// authorization denial, an `auth.denied` event is then written in a
    /// transaction of its own so the attempt stays on record.
    pub(crate) fn transact<T>(
        &self,
        operation: &'static str,
        actor: &str,
        op: impl FnOnce(&mut TxContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();
        let mut denial = None;
        let result = self.store.write(|tx| {
            store::ensure_actor(tx, actor, now)?;
            let mut ctx = TxContext {
                conn: tx,
                config: &self.config,
                now,
                actor,
                operation,
                denial: None,
            };
            let outcome = op(&mut ctx);
            denial = ctx.denial.take();
            outcome
        });
        if result.is_err() {
            if let Some(denial) = denial {
                self.record_denial(operation, actor, now, denial);
            }
        }
        result
    }

    fn record_denial(&self, operation: &str, actor: &str, now: DateTime<Utc>, denial: Denial) {
        let written = self.store.write(|tx| {
            events::append(
                tx,
                now,
                &NewEvent {
                    event_type: EventType::AuthDenied,
                    project_id: Some(&denial.project_id),
                    entity_kind: EntityKind::Rbac,
                    entity_id: Some(&denial.project_id),
                    actor_id: actor,
                    payload: denial.payload,
                },
            )
        });
        // The caller still gets the original Forbidden error.
        if let Err(err) = written {
            warn!(operation, actor, error = %err, "failed to record authorization denial");
        }
    }

    /// Run a read-only query against a consistent snapshot.
    pub(crate) fn query<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.store.read(|tx| f(tx))
    }
}

struct Denial {
    project_id: String,
    payload: Value,
}

/// State shared by every step of one operation: the open transaction, the
/// configuration, the operation's timestamp and the acting actor.
pub(crate) struct TxContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a ProoflineConfig,
    pub now: DateTime<Utc>,
    pub actor: &'a str,
    operation: &'static str,
    denial: Option<Denial>,
}

impl TxContext<'_> {
    /// Fail with `Forbidden` unless the actor holds `permission` in the project.
    pub fn require(&mut self, project_id: &str, permission: &str) -> Result<()> {
        if auth::has_permission(self.conn, project_id, self.actor, permission)? {
            return Ok(());
        }
        warn!(
            operation = self.operation,
            project = project_id,
            actor = self.actor,
            permission,
            "permission denied"
        );
        self.denial = Some(Denial {
            project_id: project_id.to_string(),
            payload: json!({
                "operation": self.operation,
                "permission": permission,
                "reason": "missing_permission",
            }),
        });
        Err(ProoflineError::Forbidden {
            permission: permission.to_string(),
        })
    }

    /// Fail with `ForbiddenAttestation` unless one of the actor's roles may
    /// issue attestations of `kind`.
    pub fn require_attestation_authority(&mut self, project_id: &str, kind: &str) -> Result<()> {
        if auth::can_attest(self.conn, project_id, self.actor, kind)? {
            return Ok(());
        }
        warn!(
            operation = self.operation,
            project = project_id,
            actor = self.actor,
            kind,
            "attestation authority denied"
        );
        self.denial = Some(Denial {
            project_id: project_id.to_string(),
            payload: json!({
                "operation": self.operation,
                "kind": kind,
                "reason": "missing_authority",
            }),
        });
        Err(ProoflineError::ForbiddenAttestation {
            kind: kind.to_string(),
        })
    }

    /// Authorize a forced operation and record that force was used. A
    /// no-op when `force` is false.
    pub fn require_force(
        &mut self,
        force: bool,
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
    ) -> Result<()> {
        if !force {
            return Ok(());
        }
        self.require(project_id, permissions::FORCE_USE)?;
        warn!(
            operation = self.operation,
            project = project_id,
            entity = entity_id,
            actor = self.actor,
            "force flag used"
        );
        self.append(
            EventType::ForceUsed,
            project_id,
            entity_kind,
            entity_id,
            json!({ "operation": self.operation }),
        )?;
        Ok(())
    }

    /// The actor must hold a live lease on the task.
    pub fn require_lease(&self, task_id: &str) -> Result<()> {
        let current = store::find_lease(self.conn, task_id)?;
        lease::check_ownership(task_id, current.as_ref(), self.actor, self.now)?;
        Ok(())
    }

    pub fn append(
        &self,
        event_type: EventType,
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        payload: Value,
    ) -> Result<i64> {
        events::append(
            self.conn,
            self.now,
            &NewEvent {
                event_type,
                project_id: Some(project_id),
                entity_kind,
                entity_id: Some(entity_id),
                actor_id: self.actor,
                payload,
            },
        )
    }
}

/// Parse caller-supplied JSON text, naming the field on failure.
pub(crate) fn parse_json(field: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| ProoflineError::validation(format!("{field} must be valid JSON: {e}")))
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProoflineError::validation(format!("{field} is required")));
    }
    Ok(())
}
