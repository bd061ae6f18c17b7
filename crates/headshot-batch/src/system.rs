use std::sync::Arc;

use headshot_common::{HeadshotError, Result, SourceImage};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::info;

use crate::{
    export::{ExportBatch, ExportConfig, ExportDispatcher, ExportTarget},
    generator::RemoteGenerator,
    job::JobRecord,
    prompts::PromptSet,
    retry::{RetryController, RetryDecision, RetryOutcome, RetryPolicy},
    scheduler::{BatchRun, BatchScheduler, SchedulerConfig},
    state::{BatchSnapshot, BatchStore, Phase},
};

#[derive(Debug, Clone, Default)]
pub struct HeadshotConfig {
    pub scheduler: SchedulerConfig,
    pub export: ExportConfig,
    pub retry: RetryPolicy,
}

/// One headshot session: the uploaded image, the prompt set, and the jobs
/// generated from them.
#[derive(Clone)]
pub struct HeadshotSys {
    prompts: PromptSet,
    // Lock order: image, then the batch store.
    image: Arc<RwLock<Option<Arc<SourceImage>>>>,
    store: BatchStore,
    scheduler: BatchScheduler,
    retries: RetryController,
    exports: ExportDispatcher,
}

impl HeadshotSys {
    pub fn new(
        generator: Arc<dyn RemoteGenerator>,
        export_target: Arc<dyn ExportTarget>,
        prompts: PromptSet,
        config: HeadshotConfig,
    ) -> Result<Self> {
        let store = BatchStore::new();
        let scheduler = BatchScheduler::new(Arc::clone(&generator), store.clone(), config.scheduler)?;
        let retries = RetryController::new(generator, store.clone(), config.retry);
        let exports = ExportDispatcher::new(store.clone(), export_target, config.export);

        Ok(Self {
            prompts,
            image: Arc::new(RwLock::new(None)),
            store,
            scheduler,
            retries,
            exports,
        })
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Replaces the source image. All jobs of the previous image are
    /// discarded, including any still in flight.
    pub async fn upload(&self, image: SourceImage) -> u64 {
        let mut current = self.image.write().await;
        let bytes = image.len();
        let mime_type = image.mime_type().to_string();
        *current = Some(Arc::new(image));
        let generation = self.store.invalidate().await;
        info!(generation, bytes, mime_type = %mime_type, "source image uploaded");
        generation
    }

    pub async fn reset(&self) -> u64 {
        let mut current = self.image.write().await;
        *current = None;
        let generation = self.store.invalidate().await;
        info!(generation, "session reset");
        generation
    }

    pub async fn source_image(&self) -> Option<Arc<SourceImage>> {
        self.image.read().await.clone()
    }

    pub async fn phase(&self) -> Phase {
        self.snapshot().await.phase
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        let image = self.image.read().await;
        self.store.snapshot(image.is_some()).await
    }

    pub async fn job(&self, index: usize) -> Result<Option<JobRecord>> {
        self.prompts.prompt(index)?;
        Ok(self.store.job(index).await)
    }

    /// Starts a batch over every prompt against the current image.
    pub async fn run_batch(&self) -> Result<BatchRun> {
        let image = self.image.read().await;
        let source = image.clone().ok_or(HeadshotError::NoSourceImage)?;
        self.scheduler.run_batch(source, self.prompts.jobs()).await
    }

    pub async fn retry(&self, index: usize) -> Result<RetryOutcome> {
        let prompt = self.prompts.prompt(index)?;
        let claimed = {
            let image = self.image.read().await;
            let source = image.clone().ok_or(HeadshotError::NoSourceImage)?;
            self.retries.claim(source, index, prompt).await?
        };
        match claimed {
            Ok(claimed) => Ok(self.retries.execute(claimed).await),
            Err(rejection) => Ok(RetryOutcome::Ignored(rejection)),
        }
    }

    pub async fn spawn_retry(
        &self,
        index: usize,
    ) -> Result<(RetryDecision, Option<JoinHandle<RetryOutcome>>)> {
        let prompt = self.prompts.prompt(index)?;
        // Held through the claim so the image and the claimed generation agree.
        let image = self.image.read().await;
        let source = image.clone().ok_or(HeadshotError::NoSourceImage)?;
        self.retries.spawn_retry(source, index, prompt).await
    }

    pub async fn export_one(&self, index: usize) -> Result<bool> {
        self.prompts.prompt(index)?;
        self.exports.export_one(index).await
    }

    pub async fn export_all(&self) -> ExportBatch {
        self.exports.export_all().await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use headshot_common::{HeadshotError, Result, ResultLocator, SourceImage};
    use tokio::sync::Semaphore;

    use super::{HeadshotConfig, HeadshotSys};
    use crate::{
        generator::RemoteGenerator,
        job::JobStatus,
        retry::{RetryOutcome, RetryRejection},
        state::Phase,
        testing::{RecordingTarget, ScriptedGenerator, prompts},
    };

    fn image(tag: u8) -> SourceImage {
        SourceImage::from_bytes("image/jpeg", vec![0xff, 0xd8, tag]).unwrap()
    }

    fn system(generator: Arc<ScriptedGenerator>, target: Arc<RecordingTarget>, count: usize) -> HeadshotSys {
        HeadshotSys::new(generator, target, prompts(count), HeadshotConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn full_session_walks_through_every_phase() {
        let generator = Arc::new(ScriptedGenerator::new().failing("prompt-2", "bad lighting"));
        let target = Arc::new(RecordingTarget::new());
        let sys = system(generator, target.clone(), 5);

        assert_eq!(sys.phase().await, Phase::Idle);
        assert!(matches!(sys.run_batch().await, Err(HeadshotError::NoSourceImage)));

        sys.upload(image(1)).await;
        assert_eq!(sys.phase().await, Phase::ImageUploaded);

        let summary = sys.run_batch().await.unwrap().wait().await.unwrap();
        assert_eq!((summary.done, summary.failed), (4, 1));

        let snapshot = sys.snapshot().await;
        assert_eq!(snapshot.phase, Phase::ResultsShown);
        assert_eq!(snapshot.progress.completed, 5);
        assert_eq!(snapshot.done_count, 4);
        assert_eq!(snapshot.error_count, 1);

        sys.export_all().await.wait().await;
        assert_eq!(target.records().len(), 4);

        sys.reset().await;
        assert_eq!(sys.phase().await, Phase::Idle);
        assert!(sys.snapshot().await.jobs.is_empty());
    }

    #[tokio::test]
    async fn second_batch_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let generator = Arc::new(ScriptedGenerator::new().gated(Arc::clone(&gate)));
        let sys = system(generator, Arc::new(RecordingTarget::new()), 2);
        sys.upload(image(1)).await;

        let run = sys.run_batch().await.unwrap();
        assert_eq!(sys.phase().await, Phase::Generating);
        assert!(matches!(sys.run_batch().await, Err(HeadshotError::BatchInProgress)));
        assert!(matches!(
            sys.retry(0).await,
            Ok(RetryOutcome::Ignored(RetryRejection::BatchRunning))
        ));

        gate.add_permits(2);
        run.wait().await.unwrap();
        assert_eq!(sys.phase().await, Phase::ResultsShown);
    }

    #[tokio::test(start_paused = true)]
    async fn new_upload_mid_run_discards_late_results() {
        let generator = Arc::new(ScriptedGenerator::new().with_latency(Duration::from_millis(100)));
        let sys = system(generator.clone(), Arc::new(RecordingTarget::new()), 8);
        sys.upload(image(1)).await;

        let stale = sys.run_batch().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let generation = sys.upload(image(2)).await;

        let fresh = sys.run_batch().await.unwrap();
        assert!(fresh.generation() > stale.generation());
        let stale_summary = stale.wait().await.unwrap();
        assert_eq!(stale_summary.discarded, 4);

        let fresh_summary = fresh.wait().await.unwrap();
        assert_eq!(fresh_summary.done, 8);

        let snapshot = sys.snapshot().await;
        assert!(snapshot.generation > generation);
        assert_eq!(snapshot.progress.completed, 8);
        assert!(snapshot.jobs.iter().all(|job| job.state.status() == JobStatus::Done));
        assert_eq!(generator.calls(), 12);
    }

    #[tokio::test]
    async fn retry_and_lookup_validate_the_index() {
        let sys = system(Arc::new(ScriptedGenerator::new()), Arc::new(RecordingTarget::new()), 3);
        assert!(matches!(sys.retry(0).await, Err(HeadshotError::NoSourceImage)));

        sys.upload(image(1)).await;
        assert!(matches!(sys.retry(5).await, Err(HeadshotError::JobNotFound(5))));
        assert!(matches!(sys.job(5).await, Err(HeadshotError::JobNotFound(5))));
        assert!(matches!(sys.export_one(3).await, Err(HeadshotError::JobNotFound(3))));
        assert!(sys.job(1).await.unwrap().is_none());

        sys.run_batch().await.unwrap().wait().await.unwrap();
        let outcome = sys.retry(1).await.unwrap();
        assert!(matches!(outcome, RetryOutcome::Settled(_)));
        assert!(sys.export_one(1).await.unwrap());
    }

    /// Tags each result with the last byte of the image it was made from.
    struct ImageTagGenerator;

    #[async_trait]
    impl RemoteGenerator for ImageTagGenerator {
        async fn generate(&self, image: &SourceImage, prompt: &str) -> Result<ResultLocator> {
            tokio::task::yield_now().await;
            let tag = image.data().last().copied().unwrap_or_default();
            Ok(ResultLocator::new(format!("mem://image-{tag}/{prompt}")))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn retry_racing_an_upload_never_mixes_images() {
        for round in 0..50 {
            let sys = HeadshotSys::new(
                Arc::new(ImageTagGenerator),
                Arc::new(RecordingTarget::new()),
                prompts(1),
                HeadshotConfig::default(),
            )
            .unwrap();
            sys.upload(image(1)).await;
            sys.run_batch().await.unwrap().wait().await.unwrap();

            let retrying = {
                let sys = sys.clone();
                tokio::spawn(async move { sys.retry(0).await })
            };
            sys.upload(image(2)).await;
            sys.run_batch().await.unwrap().wait().await.unwrap();
            // Ignored, discarded or not-found are all fine; only the stored result matters.
            let _ = retrying.await.unwrap();

            let job = sys.job(0).await.unwrap().unwrap();
            let result = job.state.result().unwrap();
            assert!(
                result.as_str().starts_with("mem://image-2/"),
                "round {round}: {result}"
            );
        }
    }
}
