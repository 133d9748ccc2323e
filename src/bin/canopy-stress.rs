//! Canopy stress driver
//!
//! Spawns a population of counter actors that each send themselves a number
//! of messages, runs the runtime to quiescence, and prints the run report.

use anyhow::Context;
use clap::Parser;
use canopy::runtime::config;
use canopy::{Handle, Runtime, RuntimeConfig, Turn};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "canopy-stress")]
#[command(about = "Spawn many self-sending actors and run them to quiescence", long_about = None)]
struct Cli {
    /// Number of counter actors to spawn
    #[arg(short, long, default_value = "100000")]
    actors: usize,

    /// Messages each actor sends itself
    #[arg(short, long, default_value = "1")]
    rounds: u64,

    /// Worker threads (0: one per CPU)
    #[arg(short, long)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trace every turn
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut runtime_config = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    runtime_config = runtime_config.with_env_overrides()?;
    if let Some(workers) = cli.workers {
        runtime_config.workers = workers;
    }
    runtime_config.debug |= cli.debug;

    let actors = cli.actors;
    let rounds = cli.rounds.max(1);
    let started = Instant::now();

    let report = Runtime::start(runtime_config, |rt: &Runtime| {
        for _ in 0..actors {
            let counter = rt.spawn_with(
                |turn: &Turn<'_>| {
                    turn.send(Handle::int(0));
                    0u64
                },
                move |turn: &Turn<'_>, count: &mut u64, _payload: Handle| {
                    *count += 1;
                    if *count < rounds {
                        turn.send(Handle::int(*count as i64));
                    }
                },
            );
            drop(counter);
        }
    })?;

    let elapsed = started.elapsed();
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "{} actors x {} rounds in {:.3}s",
        actors,
        rounds,
        elapsed.as_secs_f64()
    );
    Ok(())
}
