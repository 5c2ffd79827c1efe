//! Run-once scheduling entry point.
//!
//! Each invocation drives at most one reservation through one attempt:
//! claim, delegate to the automation agent, classify the outcome, persist
//! the transition. Invoking it with nothing eligible is a no-op, so an
//! external timer can fire it as often as it likes.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::agent::AutomationAgent;
use crate::artifact::{ArtifactStore, AttemptContext};
use crate::error::{Error, Result};
use crate::policy::{Disposition, RetryPolicy};
use crate::reservation::{ReservationKey, Status};
use crate::store::ReservationStore;
use crate::timing::wake_at;

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub retry: RetryPolicy,
    /// How long a claim stays valid. Doubles as the cooldown between
    /// attempts, since failures leave the lock in place.
    pub lock_duration: Duration,
    /// How far ahead of its activation instant an entity may be claimed.
    /// When nonzero, the runner claims early and sleeps until activation
    /// before delegating, so the agent acts the moment the window opens.
    pub claim_horizon: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lock_duration: Duration::minutes(5),
            claim_horizon: Duration::zero(),
        }
    }
}

/// Outcome of one entry-point invocation, as reported to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub key: ReservationKey,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

pub struct Runner {
    store: Arc<dyn ReservationStore>,
    agent: Arc<dyn AutomationAgent>,
    artifacts: Arc<dyn ArtifactStore>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        agent: Arc<dyn AutomationAgent>,
        artifacts: Arc<dyn ArtifactStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            agent,
            artifacts,
            config,
        }
    }

    /// Perform one claim-attempt-resolve cycle.
    ///
    /// Returns `None` when nothing was eligible, or when a concurrent
    /// runner won the claim race (the winner reports that attempt).
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Option<RunReport>> {
        let now = Utc::now();
        let Some(claimable) = self
            .store
            .find_claimable(now + self.config.claim_horizon)
            .await?
        else {
            tracing::debug!(now = %now, "No claimable reservations");
            return Ok(None);
        };

        let (locked, revision) = match claimable
            .reservation
            .claim(claimable.revision, self.config.lock_duration, self.store.as_ref())
            .await
        {
            Ok(claimed) => claimed,
            Err(Error::RevisionConflict { key, .. }) => {
                tracing::info!(key = %key, "Lost claim race to a concurrent runner");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Claimed inside the early-claim horizon: hold here until the
        // booking window actually opens.
        if locked.data.activation_time > Utc::now() {
            wake_at(locked.data.activation_time).await;
        }

        let attempt = locked.state.retry_count;
        let folder = locked
            .data
            .artifact_folder
            .clone()
            .ok_or_else(|| Error::Other(anyhow!("claimed reservation {} has no artifact folder", locked.key())))?;
        let ctx = AttemptContext::new(folder, attempt, self.artifacts.clone());
        ctx.log(format!(
            "attempt {attempt} for {} {}",
            locked.data.slot.date, locked.data.slot.time
        ));

        let outcome = self.agent.book(&locked.data.slot, &ctx).await;

        if let Err(e) = ctx.finish().await {
            tracing::warn!(key = %locked.key(), error = %e, "Failed to upload attempt log");
        }

        let report = match outcome {
            Ok(confirmation) => {
                let (executed, _) = locked
                    .succeed(Some(confirmation.booked_time), revision, self.store.as_ref())
                    .await?;
                RunReport {
                    key: executed.data.key.clone(),
                    status: Status::Executed,
                    error: None,
                    retry_count: executed.state.retry_count,
                }
            }
            Err(failure) => {
                let message = failure.to_string();
                match self.config.retry.classify(&failure, attempt) {
                    Disposition::Requeue => {
                        let (pending, _) = locked
                            .requeue(message.clone(), revision, self.store.as_ref())
                            .await?;
                        RunReport {
                            key: pending.data.key.clone(),
                            status: Status::Pending,
                            error: Some(message),
                            retry_count: pending.state.retry_count,
                        }
                    }
                    Disposition::Fail => {
                        let (failed, _) = locked
                            .fail(message.clone(), revision, self.store.as_ref())
                            .await?;
                        RunReport {
                            key: failed.data.key.clone(),
                            status: Status::Failed,
                            error: Some(message),
                            retry_count: failed.state.retry_count,
                        }
                    }
                }
            }
        };

        Ok(Some(report))
    }
}
