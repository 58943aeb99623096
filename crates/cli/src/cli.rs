use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rethread_core::Tick;

/// Drive a persistent rethread process from the terminal.
///
/// Every invocation rebuilds the process from the state file, runs the
/// requested cycles and writes the state back, just like a host that only
/// gets a slice of time per tick.
#[derive(Parser, Debug)]
#[command(name = "rethread", about = "Replay-based cooperative thread scheduler")]
pub struct CliArgs {
    /// Path to config file (default: ~/.config/rethread/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// State file override (takes precedence over config and env)
    #[arg(long, env = "RETHREAD_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a number of cycles, then print the thread table
    Run {
        /// Number of cycles to execute
        #[arg(long, default_value = "10")]
        ticks: u64,

        /// First tick to run (defaults to one past the last recorded execution)
        #[arg(long)]
        start: Option<Tick>,
    },
    /// Print the thread table of the persisted process
    Top,
    /// Discard all threads and start the root task again
    Reset,
    /// Publish an event to every subscribed thread, then run one cycle
    Interrupt {
        /// Event name, e.g. WORLD_CHANGED
        event: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let args = CliArgs::try_parse_from(["rethread", "run"]).unwrap();
        assert!(args.config.is_none());
        match args.command {
            Command::Run { ticks, start } => {
                assert_eq!(ticks, 10);
                assert_eq!(start, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_interrupt_takes_event() {
        let args = CliArgs::try_parse_from([
            "rethread",
            "--state",
            "/tmp/p.json",
            "interrupt",
            "WORLD_CHANGED",
        ])
        .unwrap();
        assert_eq!(args.state, Some(PathBuf::from("/tmp/p.json")));
        assert!(matches!(args.command, Command::Interrupt { ref event } if event == "WORLD_CHANGED"));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(CliArgs::try_parse_from(["rethread"]).is_err());
    }
}
