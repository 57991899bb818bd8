//! Lease decisions, kept free of I/O so they can be judged against any
//! clock reading.
//!
//! A lease is live while `now < expires_at`. Expiry is wall-clock based
//! and unfenced: it is the only thing that frees an abandoned task.

use chrono::{DateTime, Duration, Utc};

use crate::error::{LeaseError, ProoflineError, Result};
use crate::model::Lease;

/// Longest lease a claim or `lease.ttl_secs` may ask for: one year.
pub const MAX_TTL_SECS: u64 = 366 * 24 * 60 * 60;

pub fn is_live(lease: &Lease, now: DateTime<Utc>) -> bool {
    now < lease.expires_at
}

/// Decide whether `actor` may claim a task currently covered by `existing`.
/// Free tasks, expired leases and the actor's own lease are claimable.
pub fn check_claim(
    task_id: &str,
    existing: Option<&Lease>,
    actor: &str,
    now: DateTime<Utc>,
) -> std::result::Result<(), LeaseError> {
    match existing {
        Some(lease) if is_live(lease, now) && lease.owner_id != actor => Err(LeaseError::Held {
            task_id: task_id.to_string(),
            owner: lease.owner_id.clone(),
            expires_at: lease.expires_at.to_rfc3339(),
        }),
        _ => Ok(()),
    }
}

/// The lease written by a successful claim. Fails when `now + ttl` falls
/// outside the representable range.
pub fn grant(task_id: &str, actor: &str, now: DateTime<Utc>, ttl: Duration) -> Result<Lease> {
    let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
        ProoflineError::validation(format!("lease ttl {}s is out of range", ttl.num_seconds()))
    })?;
    Ok(Lease {
        task_id: task_id.to_string(),
        owner_id: actor.to_string(),
        acquired_at: now,
        expires_at,
    })
}

/// A non-forced content or status mutation needs a live lease held by the
/// acting actor.
pub fn check_ownership(
    task_id: &str,
    lease: Option<&Lease>,
    actor: &str,
    now: DateTime<Utc>,
) -> std::result::Result<(), LeaseError> {
    let Some(lease) = lease else {
        return Err(LeaseError::Required {
            task_id: task_id.to_string(),
        });
    };
    if !is_live(lease, now) {
        return Err(LeaseError::Expired {
            task_id: task_id.to_string(),
        });
    }
    if lease.owner_id != actor {
        return Err(LeaseError::WrongOwner {
            task_id: task_id.to_string(),
            owner: lease.owner_id.clone(),
        });
    }
    Ok(())
}

/// Release without force: the owner may always release, anyone may clear
/// an expired lease, nobody else may touch a live one.
pub fn check_release(
    lease: &Lease,
    actor: &str,
    now: DateTime<Utc>,
) -> std::result::Result<(), LeaseError> {
    if lease.owner_id == actor || !is_live(lease, now) {
        return Ok(());
    }
    Err(LeaseError::WrongOwner {
        task_id: lease.task_id.clone(),
        owner: lease.owner_id.clone(),
    })
}
