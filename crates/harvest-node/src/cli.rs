use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "harvest-node", version, about = "Multi-account rewards automation supervisor")]
pub struct Cli {
    /// Path to the (comment-tolerant JSON) config file.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Path to the accounts file.
    #[arg(short, long, default_value = "accounts.json")]
    pub accounts: PathBuf,

    /// Directory for job state, history, reports and browser profiles.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Console log format: pretty, compact or json.
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Also append logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the dashboard and the scheduler (default).
    Serve,
    /// Run all enabled accounts once, then exit.
    Run,
    /// Run a single account once, then exit.
    RunOnce {
        #[arg(long)]
        email: String,
    },
    /// Clear today's job state for every account.
    ResetToday,
}
