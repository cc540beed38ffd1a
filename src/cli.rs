use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// deploy steps override file (defaults to `watcher.yml` in the project dir)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// checkout to deploy, wins over WATCHER_PROJECT_DIR
    #[arg(short = 'C', long)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Poll the remote and deploy once on the first change (default)
    Watch,

    /// Query the remote once and print the raw snapshot
    Probe,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Watch)
    }
}
