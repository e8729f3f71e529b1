use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rerunkit::cache::CacheRegistry;
use rerunkit::demo::{self, CounterAction, SquareDemo};
use rerunkit::{util, Config, SessionRegistry};

#[derive(Debug, Parser)]
#[command(name = "rerunkit", version, about = "Replay script-style pages against session state and memoized functions")]
struct Cli {
    /// Config file to use instead of ~/.rerunkit/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (logs, default config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rerun the counter page, pressing Increment each time
    Counter {
        #[arg(long, default_value_t = 3)]
        reruns: u32,
        /// Press Reset on this rerun (1-based) instead of Increment
        #[arg(long)]
        reset_at: Option<u32>,
    },
    /// Call a memoized square repeatedly
    Square {
        #[arg(long)]
        value: i64,
        #[arg(long, default_value_t = 3)]
        calls: u32,
    },
    /// Compare memoized and plain table loading
    LoadData {
        #[arg(long, default_value_t = 5000)]
        rows: usize,
        #[arg(long, default_value_t = 3)]
        calls: u32,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    util::init_data_dir(cli.data_dir.clone());

    let config = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().with_context(|| {
            format!("loading config from {}", util::config_path().display())
        })?,
    };

    // Initialize logging to file (~/.rerunkit/logs/rerunkit.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    match cli.command {
        Command::Counter { reruns, reset_at } => run_counter(&config, reruns, reset_at),
        Command::Square { value, calls } => run_square(&config, value, calls),
        Command::LoadData { rows, calls } => run_load_data(&config, rows, calls),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn run_counter(config: &Config, reruns: u32, reset_at: Option<u32>) -> Result<()> {
    let registry = SessionRegistry::new(config.session);
    let session = registry.connect(None);

    // First contact renders the page with no button pressed
    session.rerun(|ctx| demo::counter_page(ctx, CounterAction::None))?;

    for rerun in 1..=reruns {
        let action = if reset_at == Some(rerun) {
            CounterAction::Reset
        } else {
            CounterAction::Increment
        };
        let value = session.rerun(|ctx| demo::counter_page(ctx, action))?;
        println!("rerun {}: {:?} -> counter = {}", rerun, action, value);
    }

    let value = session.rerun(|ctx| demo::counter_page(ctx, CounterAction::None))?;
    println!("Counter value: {}", value);
    Ok(())
}

fn run_square(config: &Config, value: i64, calls: u32) -> Result<()> {
    let demo = SquareDemo::new(config.cache);

    for call in 1..=calls {
        let result = demo.square(value)?;
        println!("call {}: square({}) = {}", call, value, result);
    }

    let stats = demo.cache().stats();
    println!("Body ran {} time(s)", demo.calls());
    println!("Cache hits: {}, misses: {}", stats.hits, stats.misses);
    Ok(())
}

fn run_load_data(config: &Config, rows: usize, calls: u32) -> Result<()> {
    let registry = CacheRegistry::new();
    let loader = Arc::new(demo::table_loader(config.cache));
    registry.register(&loader);

    for call in 1..=calls {
        let started = Instant::now();
        let cached = loader.invoke_shared(&rows)?;
        let cached_elapsed = started.elapsed();

        let started = Instant::now();
        let uncached = demo::generate_table(rows);
        let uncached_elapsed = started.elapsed();

        println!(
            "call {}: cached {} rows in {:?}, uncached {} rows in {:?}",
            call,
            cached.rows.len(),
            cached_elapsed,
            uncached.rows.len(),
            uncached_elapsed
        );
        if let Some(first) = cached.head(1).first() {
            println!("  cached first row: {:?}", first);
        }
    }

    let stats = loader.stats();
    println!("Cache hits: {}, misses: {}", stats.hits, stats.misses);
    println!("Cleared {} cache(s)", registry.clear_all());
    Ok(())
}
