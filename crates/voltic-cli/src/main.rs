//! Voltic CLI: runs a demo rack through the real-time engine.
//!
//! Builds a chain of one oscillator feeding envelope followers, runs it for
//! a fixed duration while sweeping the oscillator frequency through the
//! parameter smoother, and reports per-module CPU estimates on exit.

mod modules;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::Parser;
use voltic_core::Cable;
use voltic_engine::{Engine, Settings};

#[derive(Parser)]
#[command(name = "voltic")]
#[command(author, version, about = "Voltic rack engine demo", long_about = None)]
struct Args {
    /// Sample rate in Hz.
    #[arg(long, default_value_t = 44100.0)]
    sample_rate: f32,

    /// Engine thread count (1 disables the worker pool).
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 3.0)]
    duration: f32,

    /// Number of envelope followers chained after the oscillator.
    #[arg(long, default_value_t = 4)]
    followers: usize,

    /// Measure per-module CPU time and report it on exit.
    #[arg(long)]
    cpu_meter: bool,
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.sample_rate > 0.0, "sample rate must be positive");
    anyhow::ensure!(args.duration > 0.0, "duration must be positive");
    anyhow::ensure!(args.threads >= 1, "at least one engine thread is required");

    let settings = Arc::new(Settings::new());
    settings.set_sample_rate(args.sample_rate);
    settings.set_thread_count(args.threads);
    settings.set_cpu_meter(args.cpu_meter);

    let engine = Engine::new(Arc::clone(&settings));

    let vco = engine.add_module(Box::new(modules::Vco::new()));
    let mut ids = vec![vco];
    for _ in 0..args.followers {
        ids.push(engine.add_module(Box::new(modules::Follower::new())));
    }
    for pair in ids.windows(2) {
        engine.add_cable(Cable::new(pair[0], 0, pair[1], 0));
    }
    tracing::info!(modules = ids.len(), "patch built");

    engine.start();

    // Sweep the oscillator between two frequencies through the smoother.
    let started = Instant::now();
    let mut high = true;
    while started.elapsed().as_secs_f32() < args.duration {
        engine.set_smooth_param(vco, 0, if high { 0.75 } else { 0.25 });
        high = !high;
        thread::sleep(Duration::from_millis(500));
    }

    let last = ids[ids.len() - 1];
    let tail = engine
        .with_module(last, |_, core| core.outputs[0].voltage(0))
        .context("chain tail module is not registered")?;
    tracing::info!(voltage = tail, "chain tail");

    if args.cpu_meter {
        for &id in &ids {
            let micros = engine.module_cpu_time(id) * 1e6;
            tracing::info!(module = %id, cpu_us = micros, "module cpu");
        }
    }

    engine.stop();
    Ok(())
}
