use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use headshot_common::{HeadshotError, ResultLocator, Result, SourceImage};
use tokio::{sync::Semaphore, time::Instant};

use crate::{export::ExportTarget, generator::RemoteGenerator, prompts::PromptSet, queue::QueuedJob};

pub fn source_image() -> Arc<SourceImage> {
    Arc::new(SourceImage::from_bytes("image/png", vec![0x89, b'P', b'N', b'G']).unwrap())
}

pub fn prompts(count: usize) -> PromptSet {
    PromptSet::new((0..count).map(|index| format!("prompt-{index}")).collect()).unwrap()
}

pub fn jobs(count: usize) -> Vec<QueuedJob> {
    (0..count)
        .map(|index| QueuedJob::new(index, format!("prompt-{index}")))
        .collect()
}

enum Behaviour {
    Fail(String),
    Panic,
}

/// In-memory generator keyed by prompt text. Results are unique per call so
/// a regenerated job is distinguishable from its previous result.
#[derive(Default)]
pub struct ScriptedGenerator {
    latency: Duration,
    latencies: HashMap<String, Duration>,
    behaviours: HashMap<String, Behaviour>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_prompt_latency(mut self, prompt: &str, latency: Duration) -> Self {
        self.latencies.insert(prompt.to_string(), latency);
        self
    }

    pub fn failing(mut self, prompt: &str, message: &str) -> Self {
        self.behaviours
            .insert(prompt.to_string(), Behaviour::Fail(message.to_string()));
        self
    }

    pub fn panicking(mut self, prompt: &str) -> Self {
        self.behaviours.insert(prompt.to_string(), Behaviour::Panic);
        self
    }

    /// Every call waits for a permit on `gate` before completing.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteGenerator for ScriptedGenerator {
    async fn generate(&self, _image: &SourceImage, prompt: &str) -> Result<ResultLocator> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let latency = self.latencies.get(prompt).copied().unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        match self.behaviours.get(prompt) {
            Some(Behaviour::Fail(message)) => Err(HeadshotError::Generation(message.clone())),
            Some(Behaviour::Panic) => panic!("scripted panic for {prompt}"),
            None => Ok(ResultLocator::new(format!("mem://{prompt}/{call}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRecord {
    pub at: Instant,
    pub filename: String,
    pub locator: ResultLocator,
}

#[derive(Default)]
pub struct RecordingTarget {
    records: Mutex<Vec<ExportRecord>>,
    fail: bool,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ExportRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExportTarget for RecordingTarget {
    async fn save(&self, locator: &ResultLocator, filename: &str) -> Result<()> {
        self.records.lock().unwrap().push(ExportRecord {
            at: Instant::now(),
            filename: filename.to_string(),
            locator: locator.clone(),
        });
        if self.fail {
            return Err(HeadshotError::Export(format!("refused {filename}")));
        }
        Ok(())
    }
}
