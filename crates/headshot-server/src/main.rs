use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use headshot_batch::{
    DEFAULT_CONCURRENCY_LIMIT, ExportConfig, FileExportTarget, HeadshotConfig, HeadshotSys,
    JobState, PromptSet, RetryOutcome, SchedulerConfig,
};
use headshot_common::SourceImage;
use headshot_gemini::{GeminiConfig, GeminiGenerator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "headshot", about = "Batch AI headshot generator")]
struct Cli {
    #[command(flatten)]
    options: SessionOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SessionOptions {
    /// Maximum number of generation calls in flight.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY_LIMIT)]
    concurrency: usize,

    /// Delay between consecutive exports, in milliseconds.
    #[arg(long, global = true, default_value_t = 100)]
    export_interval_ms: u64,

    /// JSON array of prompts replacing the built-in set.
    #[arg(long, global = true)]
    prompts: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,

        /// Directory that exported headshots are written to.
        #[arg(long, default_value = "./headshots")]
        out: PathBuf,
    },
    /// Generate one batch from an image on disk and export the results.
    Run {
        #[arg(long)]
        image: PathBuf,

        #[arg(long, default_value = "./headshots")]
        out: PathBuf,

        /// Retry every failed job once after the batch finishes.
        #[arg(long, default_value_t = false)]
        retry_failed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::from_default_env().add_directive("headshot=info".parse()?);
    if cli.options.log_json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Command::Serve { host, port, out } => {
            let sys = build_system(&cli.options, out).await?;
            let app = headshot_api::headshot_router(Arc::new(sys));

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("headshot server listening on {addr}");
            axum::serve(listener, app).await?;
        }
        Command::Run {
            image,
            out,
            retry_failed,
        } => {
            let sys = build_system(&cli.options, out).await?;
            run_once(&sys, image, retry_failed).await?;
        }
    }

    Ok(())
}

async fn build_system(
    options: &SessionOptions,
    out: PathBuf,
) -> Result<HeadshotSys, Box<dyn std::error::Error>> {
    let prompts = match &options.prompts {
        Some(path) => PromptSet::from_json_file(path).await?,
        None => PromptSet::builtin(),
    };

    let gemini = GeminiConfig::from_env()?;
    info!(model = %gemini.model, prompts = prompts.len(), "using gemini image model");
    let generator = Arc::new(GeminiGenerator::new(gemini)?);
    let target = Arc::new(FileExportTarget::new(out)?);

    let config = HeadshotConfig {
        scheduler: SchedulerConfig {
            concurrency_limit: options.concurrency,
        },
        export: ExportConfig {
            interval: Duration::from_millis(options.export_interval_ms),
            ..ExportConfig::default()
        },
        ..HeadshotConfig::default()
    };

    Ok(HeadshotSys::new(generator, target, prompts, config)?)
}

async fn run_once(
    sys: &HeadshotSys,
    image: PathBuf,
    retry_failed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    sys.upload(SourceImage::from_path(&image).await?).await;

    let mut run = sys.run_batch().await?;
    while let Some(event) = run.next_event().await {
        let percent = event.progress.map(|progress| progress.percent).unwrap_or_default();
        match &event.state {
            JobState::Error { message } => {
                warn!(index = event.index, progress = percent, error = %message, "headshot failed")
            }
            _ => info!(index = event.index, progress = percent, "headshot ready"),
        }
    }
    let summary = run.wait().await?;
    info!(done = summary.done, failed = summary.failed, "batch finished");

    if retry_failed {
        let failed = sys
            .snapshot()
            .await
            .jobs
            .into_iter()
            .filter(|job| matches!(job.state, JobState::Error { .. }))
            .map(|job| job.index)
            .collect::<Vec<_>>();
        for index in failed {
            match sys.retry(index).await? {
                RetryOutcome::Settled(event) => match event.state.failure_reason() {
                    Some(reason) => warn!(index, error = %reason, "retry failed"),
                    None => info!(index, "retry succeeded"),
                },
                other => warn!(index, outcome = ?other, "retry did not run"),
            }
        }
    }

    let exports = sys.export_all().await;
    info!(count = exports.scheduled().len(), "exporting headshots");
    exports.wait().await;
    Ok(())
}
