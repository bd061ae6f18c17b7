use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use headshot_common::{HeadshotError, ResultLocator, Result};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::job::{JobEvent, JobRecord, JobState, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            // round(100 * completed / total), halves rounding up
            ((200 * completed.min(total) + total) / (2 * total)) as u8
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    ImageUploaded,
    Generating,
    ResultsShown,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub generation: u64,
    pub run_id: Option<Uuid>,
    pub phase: Phase,
    pub running: bool,
    pub progress: Progress,
    pub done_count: usize,
    pub error_count: usize,
    pub jobs: Vec<JobRecord>,
}

/// Identifies one batch run. Every write made on behalf of the run carries
/// its generation so that writes from an abandoned run can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    pub generation: u64,
    pub run_id: Uuid,
    pub total: usize,
}

/// Whether a settlement belongs to a batch run (and so advances progress) or
/// to a retry issued outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Batch,
    Retry,
}

#[derive(Debug, Default)]
struct BatchState {
    generation: u64,
    run_id: Option<Uuid>,
    running: bool,
    jobs: BTreeMap<usize, JobRecord>,
    completed_count: usize,
}

impl BatchState {
    fn progress(&self) -> Progress {
        Progress::new(self.completed_count, self.jobs.len())
    }

    fn settle(
        &mut self,
        generation: u64,
        index: usize,
        outcome: JobState,
        settlement: Settlement,
    ) -> Option<JobEvent> {
        if self.generation != generation {
            debug!(index, generation, current = self.generation, "stale settlement");
            return None;
        }

        let job = self.jobs.get_mut(&index)?;
        if job.state.is_settled() {
            return None;
        }
        job.state = outcome.clone();
        job.updated_at = Utc::now();

        let progress = match settlement {
            Settlement::Batch => {
                self.completed_count += 1;
                Some(self.progress())
            }
            Settlement::Retry => None,
        };

        Some(JobEvent {
            generation,
            index,
            state: outcome,
            progress,
        })
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs
            .values()
            .filter(|job| job.state.status() == status)
            .count()
    }
}

/// The single mutable structure shared by workers, retries, exports and
/// readers. Each method performs its check and its mutation under one write
/// lock acquisition.
#[derive(Debug, Clone, Default)]
pub struct BatchStore {
    inner: Arc<RwLock<BatchState>>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_current(&self, generation: u64) -> bool {
        self.inner.read().await.generation == generation
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.running
    }

    /// Replaces the state with a fresh all-pending run.
    pub async fn begin_run(&self, indices: &[usize]) -> Result<RunTicket> {
        let mut jobs = BTreeMap::new();
        for &index in indices {
            if jobs.insert(index, JobRecord::pending(index)).is_some() {
                return Err(HeadshotError::InvalidArgument(format!(
                    "job index {index} appears more than once"
                )));
            }
        }

        let mut state = self.inner.write().await;
        if state.running {
            return Err(HeadshotError::BatchInProgress);
        }

        let run_id = Uuid::new_v4();
        state.generation += 1;
        state.run_id = Some(run_id);
        state.running = true;
        state.jobs = jobs;
        state.completed_count = 0;

        Ok(RunTicket {
            generation: state.generation,
            run_id,
            total: indices.len(),
        })
    }

    pub async fn finish_run(&self, generation: u64) {
        let mut state = self.inner.write().await;
        if state.generation == generation {
            state.running = false;
        }
    }

    /// Drops every job and bumps the generation; anything still in flight
    /// for the old generation will be discarded when it settles.
    pub async fn invalidate(&self) -> u64 {
        let mut state = self.inner.write().await;
        state.generation += 1;
        state.run_id = None;
        state.running = false;
        state.jobs.clear();
        state.completed_count = 0;
        state.generation
    }

    /// Moves a pending job to its terminal state. Returns `None` when the
    /// generation is stale or the job has already settled.
    pub async fn settle(
        &self,
        generation: u64,
        index: usize,
        outcome: JobState,
        settlement: Settlement,
    ) -> Option<JobEvent> {
        self.inner
            .write()
            .await
            .settle(generation, index, outcome, settlement)
    }

    /// Settles a batch job and sends its event before the write lock is
    /// released, so events leave in the order their progress was counted.
    pub async fn settle_and_publish(
        &self,
        generation: u64,
        index: usize,
        outcome: JobState,
        events: &mpsc::UnboundedSender<JobEvent>,
    ) -> Option<JobEvent> {
        let mut state = self.inner.write().await;
        let event = state.settle(generation, index, outcome, Settlement::Batch)?;
        // The receiver may be gone; the store is still the source of truth.
        let _ = events.send(event.clone());
        Some(event)
    }

    /// Puts a settled job back to `Pending` for a retry and returns the
    /// generation the retry must settle under. `Ok(None)` means the job is
    /// already in flight.
    pub async fn claim_for_retry(&self, index: usize) -> Result<Option<u64>> {
        let mut state = self.inner.write().await;
        let job = state
            .jobs
            .get_mut(&index)
            .ok_or(HeadshotError::JobNotFound(index))?;
        if job.state.is_pending() {
            return Ok(None);
        }
        job.state = JobState::Pending;
        job.updated_at = Utc::now();
        Ok(Some(state.generation))
    }

    pub async fn job(&self, index: usize) -> Option<JobRecord> {
        self.inner.read().await.jobs.get(&index).cloned()
    }

    pub async fn progress(&self) -> Progress {
        self.inner.read().await.progress()
    }

    pub async fn completed_count(&self) -> usize {
        self.inner.read().await.completed_count
    }

    /// Every `Done` job with its result, in index order.
    pub async fn done_results(&self) -> Vec<(usize, ResultLocator)> {
        self.inner
            .read()
            .await
            .jobs
            .values()
            .filter_map(|job| job.state.result().map(|result| (job.index, result.clone())))
            .collect()
    }

    pub async fn snapshot(&self, has_image: bool) -> BatchSnapshot {
        let state = self.inner.read().await;
        let phase = match (has_image, state.running, state.jobs.is_empty()) {
            (_, true, _) => Phase::Generating,
            (false, false, _) => Phase::Idle,
            (true, false, true) => Phase::ImageUploaded,
            (true, false, false) => Phase::ResultsShown,
        };

        BatchSnapshot {
            generation: state.generation,
            run_id: state.run_id,
            phase,
            running: state.running,
            progress: state.progress(),
            done_count: state.count(JobStatus::Done),
            error_count: state.count(JobStatus::Error),
            jobs: state.jobs.values().cloned().collect(),
        }
    }
}
