use std::{collections::HashMap, fmt, future::Future, path::PathBuf, time::Duration};

use anyhow::Result;

use crate::{
    config::WatcherConfig,
    exec::command::{OutputStrategy, RunOutcome, run_command_background, run_command_with_timeout},
    log::logger::Logger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    Fetch,
    Reset,
    Build,
    Restart,
}

impl DeployStep {
    pub const ALL: [DeployStep; 4] = [
        DeployStep::Fetch,
        DeployStep::Reset,
        DeployStep::Build,
        DeployStep::Restart,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeployStep::Fetch => "fetch",
            DeployStep::Reset => "reset",
            DeployStep::Build => "build",
            DeployStep::Restart => "restart",
        }
    }

    /// The restart is launched and never awaited.
    pub fn is_background(&self) -> bool {
        matches!(self, DeployStep::Restart)
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Succeeded,
    /// exited non-zero, `None` when killed by a signal
    Failed(Option<i32>),
    TimedOut,
    /// background step spawned, outcome unknown by design
    Launched,
    /// the command line could not be split into a program and its args
    Invalid(String),
    SpawnFailed(String),
}

impl StepStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, StepStatus::Succeeded | StepStatus::Launched)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed(Some(code)) => write!(f, "failed with exit code {code}"),
            StepStatus::Failed(None) => write!(f, "terminated by signal"),
            StepStatus::TimedOut => write!(f, "timed out, process killed"),
            StepStatus::Launched => write!(f, "launched in background"),
            StepStatus::Invalid(e) => write!(f, "invalid command line: {e}"),
            StepStatus::SpawnFailed(e) => write!(f, "failed to start: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub step: DeployStep,
    pub command: String,
}

/// The fixed fetch -> reset -> build -> restart sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployPlan {
    pub steps: Vec<PlannedStep>,
}

impl DeployPlan {
    pub fn from_config(config: &WatcherConfig) -> Self {
        let steps = DeployStep::ALL
            .into_iter()
            .map(|step| {
                let command = match step {
                    DeployStep::Fetch => config.fetch_cmd(),
                    DeployStep::Reset => config.reset_cmd(),
                    DeployStep::Build => config.build_cmd(),
                    DeployStep::Restart => config.restart_cmd(),
                };
                PlannedStep { step, command }
            })
            .collect();
        Self { steps }
    }
}

/// Executes a single deploy step.
///
/// Runners report every outcome as a [`StepStatus`]; they never abort the
/// sequence.
pub trait StepRunner {
    fn run_step(&self, step: &PlannedStep) -> impl Future<Output = StepStatus> + Send;
}

/// Runs steps as real processes inside the project checkout.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub project_dir: PathBuf,
    pub timeout: Duration,
    pub env: Option<HashMap<String, String>>,
    pub logger: Logger,
}

impl ShellRunner {
    pub fn new(config: &WatcherConfig, logger: Logger) -> Self {
        Self {
            project_dir: config.project_dir.clone(),
            timeout: config.step_timeout,
            env: config.deploy.env.clone(),
            logger,
        }
    }

    fn output(&self) -> OutputStrategy {
        match self.logger.output_file() {
            Ok(file) => OutputStrategy::ToFile(file),
            Err(_) => OutputStrategy::Silent,
        }
    }
}

impl StepRunner for ShellRunner {
    async fn run_step(&self, step: &PlannedStep) -> StepStatus {
        let parts = match shell_words::split(&step.command) {
            Ok(parts) if !parts.is_empty() => parts,
            Ok(_) => return StepStatus::Invalid("empty command".to_string()),
            Err(e) => return StepStatus::Invalid(e.to_string()),
        };
        let program = &parts[0];
        let args = &parts[1..];

        if step.step.is_background() {
            return match run_command_background(
                program,
                args,
                &self.project_dir,
                self.output(),
                self.env.as_ref(),
            ) {
                Ok(_child) => StepStatus::Launched,
                Err(e) => StepStatus::SpawnFailed(e.to_string()),
            };
        }

        match run_command_with_timeout(
            program,
            args,
            &self.project_dir,
            self.timeout,
            self.output(),
            self.env.as_ref(),
        )
        .await
        {
            Ok(RunOutcome::Finished(out)) if out.status_code == Some(0) => StepStatus::Succeeded,
            Ok(RunOutcome::Finished(out)) => StepStatus::Failed(out.status_code),
            Ok(RunOutcome::TimedOut) => StepStatus::TimedOut,
            Err(e) => StepStatus::SpawnFailed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeployReport {
    pub steps: Vec<(DeployStep, StepStatus)>,
}

impl DeployReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|(_, s)| s.is_failure()).count()
    }

    pub fn status_of(&self, step: DeployStep) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, st)| st)
    }
}

pub struct Deployer<R> {
    plan: DeployPlan,
    runner: R,
    logger: Logger,
}

impl<R: StepRunner> Deployer<R> {
    pub fn new(plan: DeployPlan, runner: R, logger: Logger) -> Self {
        Self {
            plan,
            runner,
            logger,
        }
    }

    /// Runs every step in order. A failing step never stops the sequence:
    /// the next step runs on whatever state the previous one left behind.
    pub async fn deploy(&self) -> DeployReport {
        let mut report = DeployReport::default();

        if let Err(e) = self.logger.info("=== Deploy started ===").await {
            eprintln!("❌ Failed to write deploy log: {e}");
        }

        for planned in &self.plan.steps {
            if let Err(e) = self
                .logger
                .step_start(&format!("{} : {}", planned.step, planned.command))
                .await
            {
                eprintln!("❌ Failed to write deploy log: {e}");
            }

            let status = self.runner.run_step(planned).await;

            if let Err(e) = self.report_step(planned, &status).await {
                eprintln!("❌ Failed to write deploy log: {e}");
            }
            report.steps.push((planned.step, status));
        }

        let summary = format!(
            "=== Deploy finished ({} of {} steps failed) ===",
            report.failures(),
            report.steps.len()
        );
        if let Err(e) = self.logger.info(&summary).await {
            eprintln!("❌ Failed to write deploy log: {e}");
        }

        report
    }

    async fn report_step(&self, planned: &PlannedStep, status: &StepStatus) -> Result<()> {
        if status.is_failure() {
            self.logger
                .error(&format!(
                    "Step {} ({}) {status}, continuing",
                    planned.step, planned.command
                ))
                .await?;
        }
        self.logger
            .step_end(&format!("{} {status}", planned.step))
            .await?;
        Ok(())
    }
}
