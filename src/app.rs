use anyhow::Result;

use crate::{
    cli::{Cli, Commands},
    config::{
        WatcherConfig,
        parser::{load_config, locate_config},
    },
    core::{
        scheduler::{Scheduler, WatchState},
        state::BaselineStore,
    },
    exec::deploy::{DeployPlan, Deployer, ShellRunner},
    git::remote::{ConfiguredProbe, RemoteProbe, RemoteRefSnapshot},
    log::logger::Logger,
};

/// Environment (over the project `.env`), then the CLI project dir, then
/// `watcher.yml`.
pub fn build_config(cli: &Cli) -> Result<WatcherConfig> {
    let mut config = match &cli.project_dir {
        Some(dir) => {
            let mut config = WatcherConfig::from_env_in(dir)?;
            config.project_dir = dir.clone();
            config
        }
        None => WatcherConfig::from_env()?,
    };

    if let Some(path) = locate_config(cli.config.as_deref(), &config.project_dir)? {
        config = config.with_file(load_config(&path)?)?;
    }

    Ok(config)
}

pub async fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;

    match cli.command() {
        Commands::Watch => {
            handle_watch(&config).await?;
        }
        Commands::Probe => {
            let snapshot = handle_probe(&config).await;
            println!("exit code: {}", snapshot.exit_code);
            print!("{}", snapshot.raw_output);
        }
    }
    Ok(())
}

pub async fn handle_probe(config: &WatcherConfig) -> RemoteRefSnapshot {
    ConfiguredProbe::from_config(config)
        .probe(&config.repo_url, &config.branch)
        .await
}

/// Watches until the deploy has run once or Ctrl-C is received.
pub async fn handle_watch(config: &WatcherConfig) -> Result<WatchState> {
    let logger = Logger::new(&config.log_file).await?;

    println!("Watcher started!");
    logger.info("Watcher started").await?;

    let probe = ConfiguredProbe::from_config(config);
    let runner = ShellRunner::new(config, logger.clone());
    let deployer = Deployer::new(DeployPlan::from_config(config), runner, logger.clone());
    let store = config.state_file.clone().map(BaselineStore::new);

    let mut scheduler = Scheduler::start(config, probe, deployer, store, logger).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("❌ Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let state = scheduler.run(shutdown).await;
    if state == WatchState::Watching {
        println!("Watcher stopped");
    }
    Ok(state)
}
