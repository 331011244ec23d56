use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daytrack",
    version,
    about = "Daytrack: daily tasks with time tracking",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile", global = true)]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Create a task
    Add(AddArgs),
    /// Show tasks matching the date, status and priority filters
    List(ListArgs),
    /// Show every field of one task
    Info { id: i64 },
    /// Open a tracking session
    Start { id: i64 },
    /// Close the open tracking session
    Stop { id: i64 },
    /// Mark a task completed
    Done { id: i64 },
    /// Mark a completed task as not completed
    Reopen { id: i64 },
    /// Toggle the immediate flag (at most five open tasks may hold it)
    Immediate {
        id: i64,
        /// Clear the flag instead of toggling it
        #[arg(long)]
        off: bool,
    },
    /// Move the due time
    Reschedule { id: i64, due: String },
    /// Change fields of a task
    Edit(EditArgs),
    /// Remove a task
    Delete { id: i64 },
    /// Totals and time spent per priority
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Overdue, today, tomorrow and recent completions
    Overview {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Due expression: `tomorrow 9:00`, `+2h`, `2026-10-20 14:30`, `friday`
    #[arg(long, default_value = "today 23:59")]
    pub due: String,

    /// Estimated minutes
    #[arg(short = 'e', long)]
    pub estimate: Option<u32>,

    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// today, tomorrow, week, all, or YYYY-MM-DD
    #[arg(long)]
    pub date: Option<String>,

    /// all, active, completed, or overdue
    #[arg(long)]
    pub status: Option<String>,

    /// any, low, medium, or high
    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: i64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub due: Option<String>,

    #[arg(short = 'e', long)]
    pub estimate: Option<u32>,

    /// Overwrite the tracked minutes
    #[arg(long)]
    pub actual: Option<u32>,

    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub color: Option<String>,
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
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
