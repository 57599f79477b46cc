//! Windowed-inference worker.
//!
//! Reads `{motion_energy: [..], flux_of_count: [..]}` from standard input and
//! prints `{panic_detected, confidence, threshold}`. On any failure the safe
//! default `{panic_detected: false, confidence: 0.5, error}` goes to standard
//! error and the process exits with status 1.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use crowdwatch_inference::worker::{answer_window, parse_request, parse_request_json};
use crowdwatch_inference::{
    NormalizationRegime, Normalizer, OnnxSequenceModel, DEFAULT_SEQUENCE_MODEL,
};
use crowdwatch_models::{WindowResponseError, DEFAULT_WINDOW_SIZE};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "crowdwatch-infer", about = "Run the panic sequence model on one window")]
struct Args {
    /// ONNX sequence model.
    #[arg(long, env = "CROWDWATCH_SEQUENCE_MODEL", default_value = DEFAULT_SEQUENCE_MODEL)]
    model: PathBuf,

    /// Expected window length.
    #[arg(long, env = "CROWDWATCH_WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Decision threshold on the model probability.
    #[arg(long, env = "CROWDWATCH_DECISION_THRESHOLD", default_value_t = 0.5)]
    threshold: f64,

    /// `window` or `global`.
    #[arg(long, env = "CROWDWATCH_NORMALIZATION", default_value = "window")]
    normalization: String,

    /// `mean_e,std_e,mean_f,std_f` for the global regime.
    #[arg(long, env = "CROWDWATCH_GLOBAL_STATS")]
    global_stats: Option<String>,
}

fn run(args: &Args) -> anyhow::Result<String> {
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    let window = parse_request(&parse_request_json(&body)?, args.window_size)?;

    let regime = NormalizationRegime::parse(&args.normalization, args.global_stats.as_deref())?;
    let model = OnnxSequenceModel::load(&args.model, args.window_size)?;
    let response = answer_window(&model, &Normalizer::new(regime), args.threshold, &window)?;
    Ok(serde_json::to_string(&response)?)
}

fn main() {
    dotenvy::dotenv().ok();

    // stdout carries the answer; logs go to stderr ahead of any error JSON
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crowdwatch=warn,ort=error"));
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .with(env_filter)
            .init();
    }

    let args = Args::parse();
    match run(&args) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            let fallback = WindowResponseError::safe_default(e.to_string());
            let json = serde_json::to_string(&fallback).unwrap_or_else(|_| {
                r#"{"panic_detected":false,"confidence":0.5,"error":"serialization failed"}"#
                    .to_string()
            });
            eprintln!("{json}");
            std::process::exit(1);
        }
    }
}
