use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use headshot_common::{ResultLocator, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::BatchStore;

pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Host-side save action for one generated image.
#[async_trait]
pub trait ExportTarget: Send + Sync {
    async fn save(&self, locator: &ResultLocator, filename: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Delay between consecutive job indices when exporting everything.
    pub interval: Duration,
    pub filename_prefix: String,
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_EXPORT_INTERVAL,
            filename_prefix: "ai-headshot".to_string(),
            extension: "jpg".to_string(),
        }
    }
}

impl ExportConfig {
    /// Suggested filename for a job; numbering is 1-based.
    pub fn filename(&self, index: usize) -> String {
        format!("{}-{}.{}", self.filename_prefix, index + 1, self.extension)
    }

    pub fn delay_for(&self, index: usize) -> Duration {
        self.interval
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

/// Exports scheduled by one `export_all` call.
#[derive(Debug)]
pub struct ExportBatch {
    scheduled: Vec<usize>,
    handles: Vec<JoinHandle<()>>,
}

impl ExportBatch {
    pub fn scheduled(&self) -> &[usize] {
        &self.scheduled
    }

    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "export task exited abnormally");
            }
        }
    }
}

#[derive(Clone)]
pub struct ExportDispatcher {
    store: BatchStore,
    target: Arc<dyn ExportTarget>,
    config: Arc<ExportConfig>,
}

impl ExportDispatcher {
    pub fn new(store: BatchStore, target: Arc<dyn ExportTarget>, config: ExportConfig) -> Self {
        Self {
            store,
            target,
            config: Arc::new(config),
        }
    }

    /// Saves job `index` if it is `Done`. Returns whether a save was issued.
    pub async fn export_one(&self, index: usize) -> Result<bool> {
        let Some(job) = self.store.job(index).await else {
            return Ok(false);
        };
        let Some(result) = job.state.result() else {
            debug!(index, status = ?job.state.status(), "nothing to export");
            return Ok(false);
        };

        let filename = self.config.filename(index);
        self.target.save(result, &filename).await?;
        info!(index, filename = %filename, "exported result");
        Ok(true)
    }

    /// Schedules one export per `Done` job, each delayed by its index times
    /// the configured interval. Delivery is best effort: failures are logged.
    pub async fn export_all(&self) -> ExportBatch {
        let completed = self.store.done_results().await;
        let mut scheduled = Vec::with_capacity(completed.len());
        let mut handles = Vec::with_capacity(completed.len());

        for (index, _) in completed {
            let delay = self.config.delay_for(index);
            let dispatcher = self.clone();
            handles.push(tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Err(err) = dispatcher.export_one(index).await {
                    warn!(index, error = %err, "export failed");
                }
            }));
            scheduled.push(index);
        }

        info!(count = scheduled.len(), "scheduled exports");
        ExportBatch { scheduled, handles }
    }
}
