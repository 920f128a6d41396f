//! Run Command

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rubric_common::FactoryConfig;
use rubric_e2e::{DriverConfig, Runner, RunnerConfig, TargetConfig, Timeouts};

use crate::commands::CatalogArgs;
use crate::output::{print_outcome, print_warning, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root URL of the application under test
    #[arg(long, env = "RUBRIC_BASE_URL", default_value = "http://127.0.0.1:3000")]
    pub base_url: String,

    /// The application's SQLite database
    #[arg(long, env = "RUBRIC_DATABASE", default_value = "db/development.sqlite3")]
    pub database: PathBuf,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Scenarios run at once
    #[arg(short = 'j', long, env = "RUBRIC_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub request_timeout: u64,

    /// Per-fixture timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub fixture_timeout: u64,

    /// Per-scenario timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub scenario_timeout: u64,

    /// Start the application with this shell command ($PORT is set)
    #[arg(long)]
    pub start: Option<String>,

    /// Working directory for --start
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Port for --start (default: a free one)
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds to wait for the application to answer
    #[arg(long, default_value_t = 60)]
    pub startup_timeout: u64,

    /// Wait for an already running application before grading
    #[arg(long)]
    pub wait: bool,

    /// Directory for rubric-results.json
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Do not write rubric-results.json
    #[arg(long)]
    pub no_results_file: bool,

    /// Username stem for created actors
    #[arg(long, default_value = "alice")]
    pub username_stem: String,
}

impl RunArgs {
    pub fn runner_config(&self) -> RunnerConfig {
        let startup_timeout = Duration::from_secs(self.startup_timeout);
        RunnerConfig {
            database: self.database.clone(),
            driver: DriverConfig {
                base_url: self.base_url.clone(),
                request_timeout: Duration::from_secs(self.request_timeout),
                ..Default::default()
            },
            factory: FactoryConfig {
                stem: self.username_stem.clone(),
                ..Default::default()
            },
            timeouts: Timeouts {
                fixture: Duration::from_secs(self.fixture_timeout),
                scenario: Duration::from_secs(self.scenario_timeout),
            },
            concurrency: self.concurrency,
            target: self.start.as_ref().map(|command| TargetConfig {
                command: command.clone(),
                workdir: self.workdir.clone(),
                port: self.port,
                startup_timeout,
                ..Default::default()
            }),
            ready_timeout: self.wait.then_some(startup_timeout),
            output_dir: self.output.clone(),
        }
    }
}

/// Grade the application. Returns the process exit code: 0 when every
/// point was earned, 1 otherwise. Infrastructure failures are errors.
pub async fn execute(args: RunArgs, format: OutputFormat) -> Result<i32> {
    let catalog = args.catalog.load()?;
    let mut runner = Runner::new(args.runner_config()).context("Cannot open the backing store")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing scenarios in flight");
                cancel.cancel();
            }
        });
    }

    let outcome = runner.run_until_cancelled(&catalog, cancel).await?;
    runner.stop_target();

    if !args.no_results_file {
        if let Err(e) = runner.write_results(&outcome) {
            print_warning(&format!("Could not write results file: {}", e));
        }
    }

    print_outcome(&outcome, format);

    Ok(if outcome.report.all_passed() && outcome.not_run.is_empty() {
        0
    } else {
        1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_defaults_map_to_runner_config() {
        let args = Harness::parse_from(["rubric"]).run;
        let config = args.runner_config();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeouts.scenario, Duration::from_secs(60));
        assert!(config.target.is_none());
        assert!(config.ready_timeout.is_none());
        assert_eq!(config.factory.stem, "alice");
    }

    #[test]
    fn test_start_command_configures_target() {
        let args = Harness::parse_from([
            "rubric",
            "--start",
            "bin/rails server -p $PORT",
            "--port",
            "4100",
            "--tag",
            "home",
            "--wait",
        ])
        .run;
        let config = args.runner_config();
        let target = config.target.unwrap();
        assert_eq!(target.command, "bin/rails server -p $PORT");
        assert_eq!(target.port, Some(4100));
        assert_eq!(config.ready_timeout, Some(Duration::from_secs(60)));
        assert_eq!(args.catalog.tags, vec!["home".to_string()]);
    }
}
