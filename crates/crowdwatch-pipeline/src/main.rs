//! Crowd panic early-warning pipeline binary.
//!
//! Runs one session per input source, each on its own task, and prints the
//! end-of-stream summaries as JSON.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use crowdwatch_media::{open_source, DetectionSidecar};
use crowdwatch_models::StreamSummary;
use crowdwatch_pipeline::metrics::{init_metrics, set_active_streams};
use crowdwatch_pipeline::{run_stream, JsonLinesSink, PipelineConfig, SessionModels, StreamSession};

#[derive(Debug, Parser)]
#[command(name = "crowdwatch", about = "Crowd panic early warning over video streams")]
struct Args {
    /// Video files, stream URLs or image directories.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Detection sidecar (JSON lines) per input, matched by position.
    #[arg(long = "detections")]
    detections: Vec<PathBuf>,

    /// Directory receiving one telemetry file per input.
    #[arg(long, default_value = "telemetry")]
    telemetry_dir: PathBuf,

    /// Frame rate assumed for image directories.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Downscale decoded video to at most this width.
    #[arg(long)]
    max_width: Option<u32>,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crowdwatch=info,ort=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let args = Args::parse();
    info!("Starting crowdwatch");

    match run(args).await {
        Ok(true) => info!("All streams completed"),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every stream completed.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    info!("Pipeline config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!(%addr, "Prometheus exporter listening");
    }

    let models = SessionModels::load(&config).context("failed to load models")?;
    let config = Arc::new(config);
    let active = Arc::new(AtomicUsize::new(0));

    let mut streams = JoinSet::new();
    for (i, input) in args.inputs.iter().enumerate() {
        let job = StreamJob {
            input: input.clone(),
            sidecar: args.detections.get(i).cloned(),
            telemetry_dir: args.telemetry_dir.clone(),
            fps: args.fps,
            max_width: args.max_width,
        };
        let config = config.clone();
        let models = models.clone();
        let active = active.clone();
        streams.spawn(async move {
            set_active_streams(active.fetch_add(1, Ordering::Relaxed) + 1);
            let result = job.run(&config, &models).await;
            set_active_streams(active.fetch_sub(1, Ordering::Relaxed) - 1);
            (job.input, result)
        });
    }

    let mut all_ok = true;
    while let Some(joined) = streams.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => println!("{}", serde_json::to_string(&summary)?),
            Ok((input, Err(e))) => {
                error!(input = %input, "Stream failed: {:#}", e);
                all_ok = false;
            }
            Err(e) => {
                error!("Stream task aborted: {}", e);
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

struct StreamJob {
    input: String,
    sidecar: Option<PathBuf>,
    telemetry_dir: PathBuf,
    fps: f64,
    max_width: Option<u32>,
}

impl StreamJob {
    async fn run(&self, config: &PipelineConfig, models: &SessionModels) -> anyhow::Result<StreamSummary> {
        let stream_id = Uuid::new_v4().to_string();

        let mut source = open_source(&self.input, self.fps, self.max_width)
            .await
            .with_context(|| format!("cannot open source {}", self.input))?;
        let mut sidecar = match &self.sidecar {
            Some(path) => Some(
                DetectionSidecar::open(path)
                    .await
                    .with_context(|| format!("cannot open detections {}", path.display()))?,
            ),
            None => None,
        };

        let telemetry_path = self
            .telemetry_dir
            .join(format!("{}-{}.jsonl", stem(&self.input), &stream_id[..8]));
        let mut sink = JsonLinesSink::create(&telemetry_path).await?;

        let mut session = StreamSession::new(&stream_id, source.describe(), config, models);
        info!(
            stream_id = %stream_id,
            telemetry = %telemetry_path.display(),
            "Stream telemetry file"
        );

        let summary = run_stream(&mut session, source.as_mut(), sidecar.as_mut(), &mut sink).await?;
        Ok(summary)
    }
}

fn stem(input: &str) -> String {
    Path::new(input.trim_end_matches('/'))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "stream".to_string())
}
