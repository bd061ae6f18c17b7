use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub index: usize,
    pub prompt: Arc<str>,
}

impl QueuedJob {
    pub fn new(index: usize, prompt: impl Into<Arc<str>>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
        }
    }
}

/// FIFO of jobs not yet claimed by a worker. `pop` removes and returns the
/// head in one step, so a job is handed to exactly one worker.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
}

impl JobQueue {
    pub fn new(jobs: impl IntoIterator<Item = QueuedJob>) -> Self {
        Self {
            pending: Mutex::new(jobs.into_iter().collect()),
        }
    }

    pub async fn pop(&self) -> Option<QueuedJob> {
        self.pending.lock().await.pop_front()
    }
}
