//! Single-frame invocation mode.
//!
//! Reads one encoded frame from a path argument or from standard input.
//! `--mode features` prints `{motionEnergy, fluxOfCount}`; `--mode panic`
//! prints `{panic_detected, confidence, motion_energy, flux_of_count}`. On
//! failure the safe defaults plus an `error` field go to standard error and
//! the process exits with status 1.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crowdwatch_models::{FrameFeaturesError, FramePanicError};
use crowdwatch_pipeline::{frame_features, frame_panic, FrameMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "crowdwatch-frame", about = "Score a single frame")]
struct Args {
    /// Encoded frame; read from standard input when omitted.
    frame: Option<PathBuf>,

    /// `features` or `panic`.
    #[arg(long, default_value = "features")]
    mode: FrameMode,
}

fn read_frame(args: &Args) -> anyhow::Result<Vec<u8>> {
    match &args.frame {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Could not read frame from {}", path.display())),
        None => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<String> {
    let bytes = read_frame(args)?;
    let json = match args.mode {
        FrameMode::Features => serde_json::to_string(&frame_features(&bytes)?)?,
        FrameMode::Panic => serde_json::to_string(&frame_panic(&bytes)?)?,
    };
    Ok(json)
}

fn main() {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crowdwatch=warn"));
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
            let message = format!("{e:#}");
            let fallback = match args.mode {
                FrameMode::Features => serde_json::to_string(&FrameFeaturesError::zeros(message)),
                FrameMode::Panic => serde_json::to_string(&FramePanicError::safe_default(message)),
            };
            eprintln!(
                "{}",
                fallback.unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_string())
            );
            std::process::exit(1);
        }
    }
}
