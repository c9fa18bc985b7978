//! Spawned chromedriver process.

use serde_json::Value;
use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BrowserError, BrowserResult};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_POLL: Duration = Duration::from_millis(250);

/// A chromedriver child process listening on a local port.
///
/// The child is killed when this value is dropped.
#[derive(Debug)]
pub struct ChromeDriverProcess {
    child: Child,
    port: u16,
}

/// Ask the OS for a free local port.
fn free_port() -> BrowserResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| BrowserError::Process(format!("no free port: {e}")))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| BrowserError::Process(format!("no free port: {e}")))
}

impl ChromeDriverProcess {
    /// Start `path --port=<free port>` and wait until it reports ready.
    pub async fn spawn(path: &Path) -> BrowserResult<Self> {
        let port = free_port()?;
        let child = Command::new(path)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Process(format!("{}: {e}", path.display())))?;
        let mut process = Self { child, port };
        info!(port, "chromedriver started");

        if let Err(e) = process.wait_ready().await {
            process.kill().await;
            return Err(e);
        }
        Ok(process)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_ready(&mut self) -> BrowserResult<()> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        let status_url = format!("{}/status", self.url());
        let deadline = Instant::now() + STARTUP_TIMEOUT;

        loop {
            if let Ok(Some(exit)) = self.child.try_wait() {
                return Err(BrowserError::Process(format!("exited during startup: {exit}")));
            }
            match http.get(&status_url).send().await {
                Ok(response) => {
                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    if body["value"]["ready"].as_bool() == Some(true) {
                        return Ok(());
                    }
                }
                Err(e) => debug!(error = %e, "chromedriver not answering yet"),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Process(format!(
                    "not ready after {}s",
                    STARTUP_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to stop chromedriver");
        }
    }

    /// Kill the process and reap it.
    pub async fn shutdown(mut self) {
        self.kill().await;
        info!(port = self.port, "chromedriver stopped");
    }
}
