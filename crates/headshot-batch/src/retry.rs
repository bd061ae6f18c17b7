use std::sync::Arc;

use headshot_common::{Result, SourceImage};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    generator::RemoteGenerator,
    job::{JobEvent, JobState},
    scheduler::generate_contained,
    state::{BatchStore, Settlement},
};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Refuse retries while a batch run is active.
    pub block_during_batch: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            block_during_batch: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryRejection {
    AlreadyPending,
    BatchRunning,
}

/// What happened to a retry request at the moment it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum RetryDecision {
    Accepted,
    Ignored(RetryRejection),
}

#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Ignored(RetryRejection),
    Settled(JobEvent),
    /// The session moved on while the retry was in flight.
    Discarded,
}

/// A job already moved back to `Pending`, ready to run.
pub(crate) struct ClaimedRetry {
    generation: u64,
    index: usize,
    prompt: Arc<str>,
    image: Arc<SourceImage>,
}

/// Re-runs a single job outside of the batch pool. Retries never touch the
/// batch's completed count or progress.
#[derive(Clone)]
pub struct RetryController {
    generator: Arc<dyn RemoteGenerator>,
    store: BatchStore,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(generator: Arc<dyn RemoteGenerator>, store: BatchStore, policy: RetryPolicy) -> Self {
        Self {
            generator,
            store,
            policy,
        }
    }

    /// Claims job `index` and runs the retry on a background task. The
    /// decision is returned as soon as the job has been marked pending.
    pub async fn spawn_retry(
        &self,
        image: Arc<SourceImage>,
        index: usize,
        prompt: Arc<str>,
    ) -> Result<(RetryDecision, Option<JoinHandle<RetryOutcome>>)> {
        match self.claim(image, index, prompt).await? {
            Ok(claimed) => {
                let controller = self.clone();
                let handle = tokio::spawn(async move { controller.execute(claimed).await });
                Ok((RetryDecision::Accepted, Some(handle)))
            }
            Err(rejection) => Ok((RetryDecision::Ignored(rejection), None)),
        }
    }

    pub(crate) async fn claim(
        &self,
        image: Arc<SourceImage>,
        index: usize,
        prompt: Arc<str>,
    ) -> Result<std::result::Result<ClaimedRetry, RetryRejection>> {
        if self.policy.block_during_batch && self.store.is_running().await {
            info!(index, "retry ignored while a batch run is active");
            return Ok(Err(RetryRejection::BatchRunning));
        }

        let Some(generation) = self.store.claim_for_retry(index).await? else {
            info!(index, "retry ignored, job already in flight");
            return Ok(Err(RetryRejection::AlreadyPending));
        };

        info!(index, generation, "regenerating job");
        Ok(Ok(ClaimedRetry {
            generation,
            index,
            prompt,
            image,
        }))
    }

    pub(crate) async fn execute(&self, claimed: ClaimedRetry) -> RetryOutcome {
        let outcome =
            generate_contained(self.generator.as_ref(), &claimed.image, &claimed.prompt).await;
        if let JobState::Error { message } = &outcome {
            warn!(index = claimed.index, error = %message, "retry failed");
        }

        match self
            .store
            .settle(claimed.generation, claimed.index, outcome, Settlement::Retry)
            .await
        {
            Some(event) => RetryOutcome::Settled(event),
            None => {
                warn!(
                    index = claimed.index,
                    generation = claimed.generation,
                    "discarding retry result from abandoned session"
                );
                RetryOutcome::Discarded
            }
        }
    }
}
