use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "donemate",
    version,
    about = "DoneMate: focus, finish, repeat. A small task tracker.",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config file (TOML). Defaults to $DONEMATE_CONFIG or the user config dir.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the task file.
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task.
    Add {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        description: Vec<String>,
    },
    /// Show all tasks (the default).
    List,
    /// Mark a task done, or undone if it already is.
    Toggle {
        /// Position in the list (1-based), full id, or id prefix.
        task: String,
    },
    /// Replace a task's description.
    Edit {
        task: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        description: Vec<String>,
    },
    /// Delete a task.
    Delete { task: String },
    /// Delete every task.
    Clear {
        /// Confirm removing all tasks.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
    /// Totals and completion percentage.
    Stats,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Command, GlobalCli};

    #[test]
    fn add_collects_words_after_global_flags() {
        let cli = GlobalCli::parse_from(["donemate", "-v", "add", "Buy", "oat", "milk"]);
        assert_eq!(cli.verbose, 1);
        assert_eq!(
            cli.command,
            Some(Command::Add {
                description: vec!["Buy".into(), "oat".into(), "milk".into()]
            })
        );
    }

    #[test]
    fn no_subcommand_means_list() {
        let cli = GlobalCli::parse_from(["donemate", "--no-color"]);
        assert!(cli.no_color);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn edit_takes_task_then_text() {
        let cli = GlobalCli::parse_from(["donemate", "edit", "2", "Pay", "rent"]);
        assert_eq!(
            cli.command,
            Some(Command::Edit {
                task: "2".into(),
                description: vec!["Pay".into(), "rent".into()]
            })
        );
    }
}
