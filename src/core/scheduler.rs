//! Polling loop of the watcher.
//!
//! The scheduler is a two state machine. While `Watching` it re-probes the
//! remote every `poll_interval` and compares the answer with the baseline
//! captured at startup. The first conclusive change disarms the timer and
//! runs the deploy sequence once; `Triggered` is terminal.

use std::future::Future;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::{
    config::WatcherConfig,
    core::{detector::changed, state::BaselineStore},
    exec::deploy::{DeployReport, Deployer, StepRunner},
    git::remote::{RemoteProbe, RemoteRefSnapshot},
    log::logger::Logger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    Triggered,
}

pub struct Scheduler<P, R> {
    repo_url: String,
    branch: String,
    probe: P,
    deployer: Deployer<R>,
    baseline: RemoteRefSnapshot,
    /// `None` once disarmed
    ticker: Option<Interval>,
    store: Option<BaselineStore>,
    logger: Logger,
    report: Option<DeployReport>,
}

impl<P: RemoteProbe, R: StepRunner> Scheduler<P, R> {
    /// Captures the baseline and arms the timer.
    ///
    /// The first tick fires one full interval after the baseline probe. Ticks
    /// missed while a probe is running are delayed, never bunched, so two
    /// probes always start at least `poll_interval` apart.
    pub async fn start(
        config: &WatcherConfig,
        probe: P,
        deployer: Deployer<R>,
        store: Option<BaselineStore>,
        logger: Logger,
    ) -> Self {
        let mut scheduler = Self {
            repo_url: config.repo_url.clone(),
            branch: config.branch.clone(),
            probe,
            deployer,
            baseline: RemoteRefSnapshot::default(),
            ticker: None,
            store,
            logger,
            report: None,
        };

        scheduler.baseline = scheduler.capture_baseline().await;

        let period = config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        scheduler.ticker = Some(ticker);

        scheduler
            .info(&format!(
                "Watching {} on branch {} every {}s",
                scheduler.repo_url,
                scheduler.branch,
                period.as_secs()
            ))
            .await;

        scheduler
    }

    async fn capture_baseline(&self) -> RemoteRefSnapshot {
        if let Some(store) = &self.store {
            match store.load(&self.repo_url, &self.branch).await {
                Ok(Some(snapshot)) => {
                    self.info(&format!("Baseline restored from {:?}", store.path()))
                        .await;
                    return snapshot;
                }
                Ok(None) => {}
                Err(e) => {
                    self.warning(&format!("Ignoring unreadable baseline store: {e:#}"))
                        .await;
                }
            }
        }

        let snapshot = self.probe.probe(&self.repo_url, &self.branch).await;

        if snapshot.is_conclusive() {
            self.info("Baseline captured").await;
            self.persist(&snapshot).await;
        } else {
            self.warning(&format!(
                "Baseline probe inconclusive (exit code {}), any later conclusive answer counts as a change",
                snapshot.exit_code
            ))
            .await;
        }
        snapshot
    }

    pub fn state(&self) -> WatchState {
        if self.ticker.is_some() {
            WatchState::Watching
        } else {
            WatchState::Triggered
        }
    }

    pub fn baseline(&self) -> &RemoteRefSnapshot {
        &self.baseline
    }

    /// Report of the deploy run, once triggered.
    pub fn report(&self) -> Option<&DeployReport> {
        self.report.as_ref()
    }

    /// Waits for the next timer tick, then probes and compares.
    ///
    /// Returns immediately without probing once triggered.
    pub async fn tick(&mut self) -> WatchState {
        let Some(ticker) = self.ticker.as_mut() else {
            return WatchState::Triggered;
        };
        ticker.tick().await;
        self.poll_once().await
    }

    /// Ticks until the deploy has run or `shutdown` resolves.
    ///
    /// Shutdown is only honoured between ticks: a probe or a deploy that has
    /// started always runs to completion.
    pub async fn run<F>(&mut self, shutdown: F) -> WatchState
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let Some(ticker) = self.ticker.as_mut() else {
                return WatchState::Triggered;
            };

            let stop = tokio::select! {
                _ = ticker.tick() => false,
                _ = &mut shutdown => true,
            };
            if stop {
                self.info("Shutdown requested, watcher stopped").await;
                return self.state();
            }

            if self.poll_once().await == WatchState::Triggered {
                return WatchState::Triggered;
            }
        }
    }

    async fn poll_once(&mut self) -> WatchState {
        let candidate = self.probe.probe(&self.repo_url, &self.branch).await;

        if !candidate.is_conclusive() {
            self.warning(&format!(
                "Probe inconclusive (exit code {}), retrying next tick",
                candidate.exit_code
            ))
            .await;
            return WatchState::Watching;
        }

        if !changed(&self.baseline, &candidate) {
            return WatchState::Watching;
        }

        self.trigger(candidate).await;
        WatchState::Triggered
    }

    async fn trigger(&mut self, candidate: RemoteRefSnapshot) {
        // disarm before anything else, no tick may fire after this point
        self.ticker = None;

        self.info(&format!(
            "Remote head changed: {} -> {}",
            self.baseline.raw_output.trim(),
            candidate.raw_output.trim()
        ))
        .await;
        println!("🚀 New commit detected on {}, deploying", self.branch);

        self.persist(&candidate).await;

        let report = self.deployer.deploy().await;
        if report.failures() > 0 {
            eprintln!(
                "❌ Deploy finished with {} failed step(s), see {:?}",
                report.failures(),
                self.logger.path()
            );
        }
        self.report = Some(report);
    }

    async fn persist(&self, snapshot: &RemoteRefSnapshot) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save(&self.repo_url, &self.branch, snapshot).await {
            self.warning(&format!("Failed to save baseline store: {e:#}"))
                .await;
        }
    }

    async fn info(&self, msg: &str) {
        if let Err(e) = self.logger.info(msg).await {
            eprintln!("❌ Failed to write log: {e}");
        }
    }

    async fn warning(&self, msg: &str) {
        if let Err(e) = self.logger.warning(msg).await {
            eprintln!("❌ Failed to write log: {e}");
        }
    }
}
