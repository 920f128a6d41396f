//! Target management - spawning the application under test and waiting for it

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Configuration for spawning the application
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Shell command that starts the application, e.g. `bin/rails server -p $PORT`
    pub command: String,

    /// Working directory for the command
    pub workdir: PathBuf,

    /// Port to listen on (None = find free port). Exported as `PORT`.
    pub port: Option<u16>,

    /// Path polled until the application answers
    pub ready_path: String,

    /// Timeout for startup
    pub startup_timeout: Duration,

    /// Pass the application's stdout/stderr through
    pub inherit_output: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            command: "bin/rails server -p $PORT".to_string(),
            workdir: PathBuf::from("."),
            port: None,
            ready_path: "/users/sign_in".to_string(),
            startup_timeout: Duration::from_secs(60),
            inherit_output: false,
        }
    }
}

/// Handle to a running application process
pub struct TargetHandle {
    child: Child,
    stopped: bool,
    pub base_url: String,
    pub port: u16,
}

impl TargetHandle {
    /// Spawn the application and wait until it is ready
    pub async fn spawn(config: TargetConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Starting target on port {}: {}", port, config.command);

        let output = || {
            if config.inherit_output {
                Stdio::inherit()
            } else {
                Stdio::null()
            }
        };

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&config.command)
            .current_dir(&config.workdir)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output());
        // own process group, so stop() reaches whatever the shell started
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn().map_err(|e| {
            E2eError::TargetStartup(format!("failed to spawn {:?}: {}", config.command, e))
        })?;

        let mut handle = TargetHandle {
            child,
            stopped: false,
            base_url,
            port,
        };

        if let Err(e) = handle.wait_until_ready(&config).await {
            handle.stop();
            return Err(e);
        }

        info!("Target is ready at {}", handle.base_url);
        Ok(handle)
    }

    async fn wait_until_ready(&mut self, config: &TargetConfig) -> E2eResult<()> {
        let deadline = Instant::now() + config.startup_timeout;
        let client = readiness_client()?;
        let url = format!("{}{}", self.base_url, config.ready_path);
        let mut attempts = 0;

        while Instant::now() < deadline {
            attempts += 1;
            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::TargetStartup(format!(
                    "process exited with {} before becoming ready",
                    status
                )));
            }
            if poll_once(&client, &url, attempts).await {
                return Ok(());
            }
            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::TargetNotReady { url, attempts })
    }

    /// Get the base URL for this target
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the application and everything it started: SIGTERM to the
    /// process group, a grace period, then SIGKILL.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Stopping target (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let group = Pid::from_raw(self.child.id() as i32);
            if killpg(group, Signal::SIGTERM).is_ok() {
                let deadline = Instant::now() + Duration::from_millis(500);
                while Instant::now() < deadline && !matches!(self.child.try_wait(), Ok(Some(_))) {
                    std::thread::sleep(Duration::from_millis(25));
                }
                let _ = killpg(group, Signal::SIGKILL);
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for TargetHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait for an application someone else started. Any response below 500
/// counts as ready.
pub async fn wait_until_ready(base_url: &str, path: &str, limit: Duration) -> E2eResult<()> {
    let deadline = Instant::now() + limit;
    let client = readiness_client()?;
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut attempts = 0;

    while Instant::now() < deadline {
        attempts += 1;
        if poll_once(&client, &url, attempts).await {
            return Ok(());
        }
        sleep(Duration::from_millis(250)).await;
    }

    Err(E2eError::TargetNotReady { url, attempts })
}

fn readiness_client() -> E2eResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?)
}

async fn poll_once(client: &reqwest::Client, url: &str, attempts: usize) -> bool {
    match client.get(url).send().await {
        Ok(resp) if resp.status().as_u16() < 500 => true,
        Ok(resp) => {
            warn!("Readiness check returned {}", resp.status());
            false
        }
        Err(e) => {
            if attempts == 1 {
                info!("Waiting for target to start...");
            }
            // Connection refused is expected while the target boots
            if !e.is_connect() {
                debug!("Readiness check error: {}", e);
            }
            false
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
