// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurring cleanup sweep (spec §3, §4.6): expire challenges whose
//! `expiresAt` has passed, and prune terminal challenges past the
//! retention window.

use std::sync::Arc;
use std::time::Duration;

use crate::orchestrator::Orchestrator;

const CLEANUP_JOB_ID: &str = "cleanup-sweep";

/// Register the recurring sweep with `orchestrator.scheduler` rather than
/// spawning its own loop, so it stops on the same shutdown signal as every
/// other background job (`Scheduler::schedule_recurring` selects on its
/// `CancellationToken`, grounded on the teacher's `spawn_health_checker`)
/// and so `Scheduler::shutdown` actually has something to abort.
pub async fn spawn_cleanup_sweeper(orchestrator: Arc<Orchestrator>, interval: Duration, retention_days: i64) {
    let scheduler = orchestrator.scheduler.clone();
    scheduler
        .schedule_recurring(CLEANUP_JOB_ID.to_owned(), interval, move || {
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                match orchestrator.mark_expired().await {
                    Ok(count) if count > 0 => tracing::info!(count, "expired stale pending challenges"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(err = %e, "mark_expired sweep failed"),
                }

                match orchestrator.delete_terminal_older_than(retention_days).await {
                    Ok(count) if count > 0 => {
                        tracing::info!(count, "pruned terminal challenges past retention")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(err = %e, "delete_terminal_older_than sweep failed"),
                }
            }
        })
        .await;
}
