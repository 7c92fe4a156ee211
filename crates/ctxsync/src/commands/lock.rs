//! Context lock commands
//!
//! A lock taken with `lock acquire` outlives this process; it is released
//! by `lock release` from the same agent or expires once stale.

use std::time::Duration;

use libctxsync_core::CoreError;
use libctxsync_store::{LockAttempt, LockError, LockInfo, StoreError};
use serde::Serialize;

use crate::cli::{Cli, LockCommand};
use crate::context::CtxContext;
use crate::output::output_success;

#[derive(Serialize)]
struct LockAcquireOutput {
    agent_id: String,
    pid: u32,
    acquired_at: u64,
    recovered_stale: bool,
    stale_after_ms: u64,
}

#[derive(Serialize)]
struct LockReleaseOutput {
    released: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_holder: Option<LockInfo>,
}

pub fn run(cli: &Cli, cmd: LockCommand) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = ctx.open_store();
    let lock = store.lock();

    match cmd {
        LockCommand::Status => {
            let status = lock.status().map_err(lock_error)?;
            output_success(cli, status, |s| match &s.holder {
                None if !s.locked => "Unlocked".to_string(),
                None => "Locked by an unreadable marker".to_string(),
                Some(h) => format!(
                    "Locked by agent '{}' (pid {}) for {}ms{}{}",
                    h.agent_id,
                    h.pid,
                    s.age_ms.unwrap_or(0),
                    if s.is_own { ", this agent" } else { "" },
                    if s.stale { ", stale" } else { "" }
                ),
            });
        }
        LockCommand::Acquire { timeout_ms } => {
            std::fs::create_dir_all(store.state_dir())?;
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| ctx.config.lock.timeout());
            match lock
                .acquire(timeout, ctx.config.lock.retry_interval())
                .map_err(lock_error)?
            {
                LockAttempt::Acquired {
                    info,
                    recovered_stale,
                } => {
                    let output = LockAcquireOutput {
                        agent_id: info.agent_id,
                        pid: info.pid,
                        acquired_at: info.acquired_at,
                        recovered_stale,
                        stale_after_ms: ctx.config.lock.stale_after_ms,
                    };
                    output_success(cli, output, |o| {
                        format!(
                            "Lock acquired by '{}' (expires after {}s without release)",
                            o.agent_id,
                            o.stale_after_ms / 1000
                        )
                    });
                }
                LockAttempt::Held { holder } => {
                    return Err(lock_error(LockError::Timeout {
                        holder,
                        waited_ms: timeout.as_millis() as u64,
                    }));
                }
            }
        }
        LockCommand::Release { force } => {
            let holder = lock.holder().map_err(lock_error)?;
            // Markers from an earlier invocation of this agent carry another pid
            let same_agent = holder.as_ref().is_some_and(|h| h.agent_id == ctx.agent_id);
            let previous_holder = if force || same_agent {
                lock.force_release().map_err(lock_error)?
            } else {
                lock.release().map_err(lock_error)?;
                holder
            };
            let output = LockReleaseOutput {
                released: previous_holder.is_some(),
                previous_holder,
            };
            output_success(cli, output, |o| match &o.previous_holder {
                Some(h) => format!("Released lock held by '{}' (pid {})", h.agent_id, h.pid),
                None => "No lock to release".to_string(),
            });
        }
    }
    Ok(())
}

fn lock_error(err: LockError) -> CoreError {
    StoreError::from(err).into()
}
