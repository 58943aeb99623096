mod cli;
mod config;
mod tasks;
mod world;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rethread_core::{FileStore, ProcessState, StateStore, Tick};
use rethread_runtime::{Process, ProcessConfig, TopReport};

use crate::cli::{CliArgs, Command};
use crate::world::{World, WORLD_CHANGED};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    rethread_core::config::load_dotenv();
    let args = CliArgs::parse();

    let mut config = config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(state) = args.state {
        config.state_path = state;
    }
    config.log_summary();

    let mut store = FileStore::new(config.state_path.clone(), config.state_format);
    let persisted = store.read().context("failed to read process state")?;
    let last_tick = persisted.as_ref().and_then(last_execution);

    if let Command::Top = args.command {
        let state = persisted.unwrap_or_default();
        print!("{}", TopReport::from_state(&state, last_tick.unwrap_or(0)));
        return Ok(());
    }

    let start = match &args.command {
        Command::Run { start: Some(start), .. } => *start,
        _ => last_tick.map_or(0, |tick| tick.saturating_add(1)),
    };

    let mut world = World::new();
    world.refresh(start);

    let process_config = ProcessConfig::new(tasks::ROOT_TASK, tasks::all(), world)
        .with_store(store)
        .with_runtime(config);
    let mut process = Process::new(process_config).context("failed to construct process")?;

    match args.command {
        Command::Run { ticks, .. } => {
            for tick in start..start + ticks {
                let changed = process.ctx().borrow_mut().refresh(tick);
                if changed {
                    info!(tick, "World layout changed");
                    process.interrupt(WORLD_CHANGED)?;
                }
                let report = process.execute(tick).with_context(|| format!("cycle {tick} failed"))?;
                info!(
                    tick = report.tick,
                    passes = report.passes,
                    threads = report.live_threads,
                    "Cycle complete"
                );
            }
            print!("{}", process.top());
        }
        Command::Reset => {
            process.reset()?;
            process.execute(start)?;
            info!(tick = start, "Process reset");
            print!("{}", process.top());
        }
        Command::Interrupt { event } => {
            process.interrupt(&event)?;
            process.execute(start)?;
            info!(event = %event, tick = start, "Interrupt delivered");
        }
        Command::Top => {}
    }

    Ok(())
}

/// Latest tick any live thread ran at, or `None` for a fresh state.
fn last_execution(state: &ProcessState) -> Option<Tick> {
    state
        .active_thread_states
        .values()
        .map(|thread| thread.last_execution)
        .max()
}
