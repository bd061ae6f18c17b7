use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{FutureExt, Stream, stream};
use headshot_common::{HeadshotError, Result, SourceImage};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    generator::RemoteGenerator,
    job::{JobEvent, JobState},
    queue::{JobQueue, QueuedJob},
    state::BatchStore,
};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(HeadshotError::InvalidArgument(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    /// Settlements dropped because the run was abandoned before they landed.
    pub discarded: usize,
}

#[derive(Debug, Default)]
struct RunCounters {
    done: AtomicUsize,
    failed: AtomicUsize,
    discarded: AtomicUsize,
}

struct WorkerContext {
    worker_id: usize,
    generation: u64,
    image: Arc<SourceImage>,
    queue: Arc<JobQueue>,
    store: BatchStore,
    generator: Arc<dyn RemoteGenerator>,
    counters: Arc<RunCounters>,
    events: mpsc::UnboundedSender<JobEvent>,
}

/// Handle to a running batch. Settlement events arrive in completion order;
/// the channel closes once every worker has exited.
pub struct BatchRun {
    generation: u64,
    run_id: Uuid,
    total: usize,
    events: mpsc::UnboundedReceiver<JobEvent>,
    handle: JoinHandle<BatchSummary>,
}

impl BatchRun {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = JobEvent> {
        stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    pub async fn wait(self) -> Result<BatchSummary> {
        self.handle.await.map_err(|err| {
            HeadshotError::InternalError(format!("batch run task failed: {err}"))
        })
    }
}

#[derive(Clone)]
pub struct BatchScheduler {
    generator: Arc<dyn RemoteGenerator>,
    store: BatchStore,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        generator: Arc<dyn RemoteGenerator>,
        store: BatchStore,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator,
            store,
            config,
        })
    }

    /// Starts a fresh run over `jobs`, fanning out over at most
    /// `concurrency_limit` workers that share one FIFO queue.
    pub async fn run_batch(&self, image: Arc<SourceImage>, jobs: Vec<QueuedJob>) -> Result<BatchRun> {
        let indices = jobs.iter().map(|job| job.index).collect::<Vec<_>>();
        let ticket = self.store.begin_run(&indices).await?;
        let worker_count = self.config.concurrency_limit.min(ticket.total);

        info!(
            run_id = %ticket.run_id,
            generation = ticket.generation,
            total = ticket.total,
            workers = worker_count,
            "starting batch run"
        );

        let queue = Arc::new(JobQueue::new(jobs));
        let counters = Arc::new(RunCounters::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let context = WorkerContext {
                    worker_id,
                    generation: ticket.generation,
                    image: Arc::clone(&image),
                    queue: Arc::clone(&queue),
                    store: self.store.clone(),
                    generator: Arc::clone(&self.generator),
                    counters: Arc::clone(&counters),
                    events: events_tx.clone(),
                };
                tokio::spawn(run_worker(context))
            })
            .collect::<Vec<_>>();
        drop(events_tx);

        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            for worker in workers {
                if let Err(err) = worker.await {
                    warn!(generation = ticket.generation, error = %err, "batch worker exited abnormally");
                }
            }
            store.finish_run(ticket.generation).await;

            let summary = BatchSummary {
                total: ticket.total,
                done: counters.done.load(Ordering::SeqCst),
                failed: counters.failed.load(Ordering::SeqCst),
                discarded: counters.discarded.load(Ordering::SeqCst),
            };
            info!(
                run_id = %ticket.run_id,
                done = summary.done,
                failed = summary.failed,
                discarded = summary.discarded,
                "batch run finished"
            );
            summary
        });

        Ok(BatchRun {
            generation: ticket.generation,
            run_id: ticket.run_id,
            total: ticket.total,
            events: events_rx,
            handle,
        })
    }
}

async fn run_worker(context: WorkerContext) {
    loop {
        // An abandoned run stops claiming work; calls already made run out.
        if !context.store.is_current(context.generation).await {
            debug!(worker = context.worker_id, "run abandoned, worker exiting");
            break;
        }
        let Some(job) = context.queue.pop().await else {
            break;
        };

        debug!(worker = context.worker_id, index = job.index, "dispatching job");
        let outcome = generate_contained(
            context.generator.as_ref(),
            &context.image,
            &job.prompt,
        )
        .await;

        match &outcome {
            JobState::Error { message } => {
                warn!(index = job.index, error = %message, "job failed");
            }
            _ => debug!(index = job.index, "job done"),
        }
        let failed = !matches!(outcome, JobState::Done { .. });

        match context
            .store
            .settle_and_publish(context.generation, job.index, outcome, &context.events)
            .await
        {
            Some(event) => {
                let counter = if failed {
                    &context.counters.failed
                } else {
                    &context.counters.done
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(progress) = event.progress {
                    info!(
                        index = job.index,
                        completed = progress.completed,
                        total = progress.total,
                        progress = progress.percent,
                        "job settled"
                    );
                }
            }
            None => {
                context.counters.discarded.fetch_add(1, Ordering::SeqCst);
                warn!(
                    index = job.index,
                    generation = context.generation,
                    "discarding completion from abandoned run"
                );
            }
        }
    }
}

/// Runs one generation call and folds every way it can end, panics included,
/// into a terminal job state.
pub(crate) async fn generate_contained(
    generator: &dyn RemoteGenerator,
    image: &SourceImage,
    prompt: &str,
) -> JobState {
    match AssertUnwindSafe(generator.generate(image, prompt))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => JobState::Done { result },
        Ok(Err(err)) => JobState::failed(&err),
        Err(_) => JobState::failed_with("image generation task panicked"),
    }
}
