//! Run orchestration: target lifecycle, capability gates, bounded scenario
//! concurrency and result collection

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rubric_common::{
    aggregate, FactoryConfig, FixtureFactory, Outcome, ScenarioResult, ScoreReport, Store,
};

use crate::catalog::Catalog;
use crate::driver::DriverConfig;
use crate::engine::{run_scenario, ScenarioEnv, Timeouts};
use crate::error::E2eResult;
use crate::probe::{probe, GateVerdict};
use crate::scenario::Scenario;
use crate::target::{self, TargetConfig, TargetHandle};

/// Configuration for a grading run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// The target's SQLite database
    pub database: PathBuf,
    pub driver: DriverConfig,
    pub factory: FactoryConfig,
    pub timeouts: Timeouts,
    /// Scenarios in flight at once
    pub concurrency: usize,
    /// Spawn the target instead of using one that is already running
    pub target: Option<TargetConfig>,
    /// Wait this long for an already running target to answer
    pub ready_timeout: Option<Duration>,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            database: rubric_common::default_database_path(),
            driver: DriverConfig::default(),
            factory: FactoryConfig::default(),
            timeouts: Timeouts::default(),
            concurrency: 4,
            target: None,
            ready_timeout: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub report: ScoreReport,
    /// Scenarios never started because the run was cancelled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<String>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn was_cancelled(&self) -> bool {
        !self.not_run.is_empty()
    }
}

struct Job {
    index: usize,
    group: Arc<str>,
    scenario: Arc<Scenario>,
}

/// Grading runner
pub struct Runner {
    config: RunnerConfig,
    store: Store,
    target: Option<TargetHandle>,
}

impl Runner {
    /// Open the backing store; failure here is fatal for the run.
    pub fn new(config: RunnerConfig) -> E2eResult<Self> {
        let store = Store::open(&config.database)?;
        info!("Using database {}", store.location());
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: RunnerConfig, store: Store) -> Self {
        Self {
            config,
            store,
            target: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start the target if one is configured, or wait for the external one.
    pub async fn start_target(&mut self) -> E2eResult<()> {
        if self.target.is_some() {
            return Ok(()); // Already running
        }

        if let Some(target_config) = self.config.target.clone() {
            let handle = TargetHandle::spawn(target_config).await?;
            self.config.driver.base_url = handle.base_url().to_string();
            self.target = Some(handle);
        } else if let Some(limit) = self.config.ready_timeout {
            target::wait_until_ready(&self.config.driver.base_url, &self.config.driver.sign_in_path, limit)
                .await?;
        }
        Ok(())
    }

    pub fn stop_target(&mut self) {
        if let Some(mut handle) = self.target.take() {
            handle.stop();
        }
    }

    pub async fn run(&mut self, catalog: &Catalog) -> E2eResult<RunOutcome> {
        self.run_until_cancelled(catalog, CancellationToken::new()).await
    }

    /// Run every scenario of the catalog. After `cancel` fires no further
    /// scenario starts; those are reported in [`RunOutcome::not_run`].
    pub async fn run_until_cancelled(
        &mut self,
        catalog: &Catalog,
        cancel: CancellationToken,
    ) -> E2eResult<RunOutcome> {
        let start = Instant::now();
        let unreachable = match self.start_target().await {
            Ok(()) => None,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("Target unavailable: {}", e);
                Some(format!(
                    "The application never became ready, so this behavior could not be checked. {}",
                    e
                ))
            }
        };

        let env = ScenarioEnv {
            factory: FixtureFactory::new(self.store.clone(), self.config.factory.clone()),
            driver: self.config.driver.clone(),
            timeouts: self.config.timeouts,
        };

        info!(
            "Running {} scenario(s) worth {} points against {}",
            catalog.scenario_count(),
            catalog.total_points(),
            env.driver.base_url
        );

        let mut slots: Vec<Option<ScenarioResult>> = vec![None; catalog.scenario_count()];
        let mut jobs = Vec::new();
        let mut index = 0;

        for group in catalog.groups() {
            let verdict = match probe(&self.store, &group.requires) {
                Ok(verdict) => Some(verdict),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Capability probe for {} failed: {}", group.name, e);
                    None
                }
            };
            let closed = match (&unreachable, &verdict) {
                (Some(diagnostic), _) => Some(diagnostic.clone()),
                (None, Some(GateVerdict::Open)) => None,
                (None, Some(verdict)) => Some(group.closed_gate_diagnostic(verdict)),
                (None, None) => {
                    Some(format!("Could not inspect the database for \"{}\".", group.name))
                }
            };
            if let (Some(diagnostic), None) = (&closed, &unreachable) {
                warn!("Skipping group {}: {}", group.name, diagnostic);
            }

            let group_name: Arc<str> = Arc::from(group.name.as_str());
            for scenario in &group.scenarios {
                match &closed {
                    Some(diagnostic) => {
                        slots[index] = Some(ScenarioResult::errored(
                            group.name.clone(),
                            scenario.name.clone(),
                            scenario.points,
                            diagnostic.clone(),
                        ));
                    }
                    None => jobs.push(Job {
                        index,
                        group: group_name.clone(),
                        scenario: Arc::new(scenario.clone()),
                    }),
                }
                index += 1;
            }
        }

        let concurrency = self.config.concurrency.max(1);
        let mut results = stream::iter(jobs.into_iter().map(|job| {
            let env = env.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (job.index, None);
                }
                let Job { index, group, scenario } = job;
                let task = {
                    let group = group.clone();
                    let scenario = scenario.clone();
                    tokio::spawn(async move { run_scenario(&group, &scenario, &env).await })
                };
                let result = match task.await {
                    Ok(result) => result,
                    Err(join) => ScenarioResult::errored(
                        group.as_ref(),
                        scenario.name.clone(),
                        scenario.points,
                        format!("Scenario worker failed: {}", join),
                    ),
                };
                (index, Some(result))
            }
        }))
        .buffer_unordered(concurrency);

        while let Some((index, result)) = results.next().await {
            if let Some(result) = result {
                log_result(&result);
                slots[index] = Some(result);
            }
        }

        let mut not_run = Vec::new();
        let mut collected = Vec::with_capacity(slots.len());
        for ((_, scenario), slot) in catalog.scenarios().zip(slots) {
            match slot {
                Some(result) => collected.push(result),
                None => not_run.push(scenario.name.clone()),
            }
        }
        if !not_run.is_empty() {
            warn!("Run cancelled; {} scenario(s) not run", not_run.len());
        }

        let report = aggregate(collected);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Score: {} ({} ms)", report.summary_line(), duration_ms);

        Ok(RunOutcome {
            report,
            not_run,
            duration_ms,
        })
    }

    /// Write the run outcome to `rubric-results.json` in the output directory
    pub fn write_results(&self, outcome: &RunOutcome) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("rubric-results.json");
        let json = serde_json::to_string_pretty(outcome)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop_target();
    }
}

fn log_result(result: &ScenarioResult) {
    let diagnostic = result.diagnostic.as_deref().unwrap_or_default();
    match result.outcome {
        Outcome::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
        Outcome::Failed => warn!("✗ {} - {}", result.name, diagnostic),
        Outcome::Errored => error!("! {} - {}", result.name, diagnostic),
    }
    debug!("{} / {}: {}", result.group, result.name, result.outcome);
}
