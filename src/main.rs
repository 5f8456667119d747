use std::{path::PathBuf, time::Duration};

use blob_encoder::Settings;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::config::{AssetLocation, DEFAULT_ASSET_PATH, DemoConfig};

mod compositor;
mod config;
mod demo;
mod error;
mod orchestrator;
mod scheduler;
mod source;
mod surface;
#[cfg(test)]
mod testing;

/// Shows a synchronous encode freezing everything scheduled on a
/// single-threaded runtime.
#[derive(Parser, Debug)]
#[command(name = "stall-demo", version)]
struct Args {
    /// Base URL the default asset is fetched from.
    #[arg(long, default_value = "http://localhost:3000")]
    base_url: String,

    /// Path of the default asset under the base URL.
    #[arg(long, default_value = DEFAULT_ASSET_PATH)]
    asset_path: String,

    /// Load the default asset from a local file instead of HTTP.
    #[arg(long, conflicts_with_all = ["base_url", "asset_path"])]
    asset_file: Option<PathBuf>,

    /// File to select before encoding.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Number of encode rounds.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=1000))]
    rounds: u32,

    #[arg(long, default_value_t = 500)]
    warmup_ms: u64,

    #[arg(long, default_value_t = 500)]
    cooldown_ms: u64,

    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    animation_interval_ms: u64,

    /// Degrees the animation advances per tick.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..360))]
    phase_step: u32,

    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    input_interval_ms: u64,

    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    render_interval_ms: u64,

    /// Seconds before fetching the default asset gives up and falls back.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=3600))]
    fetch_timeout_secs: u64,

    /// Size of the generated payload used when the asset cannot be loaded.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=1024))]
    fallback_size_mib: u64,

    #[arg(long, default_value_t = 0x5eed)]
    fallback_seed: u64,

    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=255))]
    primary_shards: u64,

    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u64).range(0..=254))]
    secondary_shards: u64,

    /// Print the final report as JSON.
    #[arg(long)]
    json: bool,
}

impl TryFrom<Args> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        let asset = match args.asset_file {
            Some(path) => AssetLocation::File { path },
            None => AssetLocation::Http {
                base_url: args.base_url,
                path: args.asset_path,
            },
        };
        DemoConfig {
            asset,
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
            fallback_seed: args.fallback_seed,
            animation_interval: Duration::from_millis(args.animation_interval_ms),
            phase_step: args.phase_step,
            input_interval: Duration::from_millis(args.input_interval_ms),
            render_interval: Duration::from_millis(args.render_interval_ms),
            rounds: args.rounds,
            warmup: Duration::from_millis(args.warmup_ms),
            cooldown: Duration::from_millis(args.cooldown_ms),
            encoder: Settings::new(args.primary_shards as usize, args.secondary_shards as usize),
            selected_file: args.file,
            json_report: args.json,
            ..DemoConfig::default()
        }
        .fallback_size_mib(args.fallback_size_mib as usize)
    }
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("stall_demo", log::LevelFilter::Debug)
        .filter_module("blob_encoder", log::LevelFilter::Debug)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();
}

// One thread on purpose: the encode has to starve everything else.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();
    config::init(Args::parse().try_into()?);
    let config = config::config();
    log::info!(
        "stall-demo: asset {}, {} round(s)",
        config.asset.describe(),
        config.rounds
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel_clone.cancelled() => {},
            _ = tokio::signal::ctrl_c() => {
                log::info!("stall-demo: interrupted");
                cancel_clone.cancel();
            },
        }
    });

    let demo = demo::Demo::new(config.clone())?;
    let report = demo.run(cancel.clone()).await?;
    cancel.cancel();

    if config.json_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for round in &report.rounds {
            println!(
                "round {}: {:?} | frames stalled {}ms | input stalled {}ms | compositor ticks {}",
                round.round,
                round.outcome,
                round.max_frame_gap_ms,
                round.input.max_latency_ms,
                round.compositor_ticks
            );
        }
        println!(
            "counter {} | text {:?} | {} click(s) rejected while busy",
            report.counter, report.text, report.rejected_clicks
        );
    }
    Ok(())
}
