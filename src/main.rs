use clap::Parser;

use watcher_lib::{app, cli::Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    app::run(&cli).await
}
