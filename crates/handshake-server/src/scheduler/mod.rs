// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (spec §4.6): delayed and recurring jobs keyed by stable,
//! caller-chosen IDs. In-process implementation — a job lost to a process
//! restart is equivalent to one that lost a race, which handlers already
//! tolerate by re-checking state before acting.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type JobId = String;
type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct Scheduler {
    handles: Arc<Mutex<HashMap<JobId, JoinHandle<()>>>>,
    shutdown: CancellationToken,
}

pub fn timeout_job_id(challenge_id: Uuid, attempt: u32) -> JobId {
    format!("timeout-{challenge_id}-{attempt}")
}

impl Scheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { handles: Arc::new(Mutex::new(HashMap::new())), shutdown }
    }

    /// Schedule `job` to run after `after`, stored under `id`. Replaces any
    /// job already scheduled under the same id, matching the idempotence
    /// spec.md requires of `ScheduleTimeout` for a repeated `(challenge,
    /// attempt)` pair.
    pub async fn schedule(&self, id: JobId, after: Duration, job: Job) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            job.await;
        });
        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.insert(id, handle) {
            old.abort();
        }
    }

    pub async fn schedule_timeout(
        &self,
        challenge_id: Uuid,
        attempt: u32,
        after: Duration,
        job: Job,
    ) {
        self.schedule(timeout_job_id(challenge_id, attempt), after, job).await;
    }

    pub async fn cancel_timeout(&self, challenge_id: Uuid, attempt: u32) {
        self.cancel(&timeout_job_id(challenge_id, attempt)).await;
    }

    pub async fn cancel(&self, id: &str) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.remove(id) {
            handle.abort();
        }
    }

    /// Spawn a recurring job that runs `job_fn` every `period`, stored
    /// under `id`. Used for the cleanup sweep (spec §4.6). Stops on the
    /// Scheduler's shutdown signal rather than running forever, same as
    /// every other background loop in this process.
    pub async fn schedule_recurring<F, Fut>(&self, id: JobId, period: Duration, job_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                job_fn().await;
            }
        });
        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.insert(id, handle) {
            old.abort();
        }
    }

    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
