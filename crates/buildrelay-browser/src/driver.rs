//! UI automation driver: owns the browser session for one submission.

use async_trait::async_trait;
use buildrelay_core::{Interrupted, TemConfig, WebDriverConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::Browser;
use crate::click::UiTimeouts;
use crate::error::{BrowserResult, UiError};
use crate::form::{SubmissionReport, TemSubmission};
use crate::webdriver::WebDriverSession;

/// Opens browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>>;
}

/// Launches Chrome through WebDriver, spawning chromedriver when configured.
pub struct ChromeLauncher {
    config: WebDriverConfig,
}

impl ChromeLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>> {
        let session = match &self.config.chromedriver_path {
            Some(_) => WebDriverSession::launch_chromedriver(&self.config).await?,
            None => WebDriverSession::start(&self.config.url, &self.config).await?,
        };
        Ok(Box::new(session))
    }
}

/// Drives the TEM submission sequence in a fresh browser session.
pub struct UiAutomationDriver {
    launcher: Box<dyn BrowserLauncher>,
    tem: TemConfig,
    timeouts: UiTimeouts,
}

impl UiAutomationDriver {
    pub fn new(launcher: Box<dyn BrowserLauncher>, tem: TemConfig, timeouts: UiTimeouts) -> Self {
        Self {
            launcher,
            tem,
            timeouts,
        }
    }

    /// Driver for a real Chrome described by `webdriver`.
    pub fn chrome(webdriver: &WebDriverConfig, tem: TemConfig) -> Self {
        Self::new(
            Box::new(ChromeLauncher::new(webdriver.clone())),
            tem,
            UiTimeouts::from(webdriver),
        )
    }

    /// Submit the execution job.
    ///
    /// The browser session is closed on every path out of this function
    /// once it has been opened, including step failures and cancellation.
    pub async fn submit(&self, cancel: &CancellationToken) -> Result<SubmissionReport, UiError> {
        if cancel.is_cancelled() {
            return Err(UiError::Interrupted(Interrupted));
        }
        info!("Starting TEM automation");
        // Launch runs to completion so every session created here is quit below.
        let browser = self.launcher.launch().await.map_err(|e| {
            error!(error = %e, "Could not start browser session");
            UiError::Launch(e)
        })?;
        if cancel.is_cancelled() {
            warn!("UI automation interrupted during browser launch");
            if let Err(e) = browser.quit().await {
                warn!(error = %e, "Browser teardown reported an error");
            }
            return Err(UiError::Interrupted(Interrupted));
        }

        let result = {
            let submission = TemSubmission::new(browser.as_ref(), &self.tem, self.timeouts);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("UI automation interrupted");
                    Err(UiError::Interrupted(Interrupted))
                }
                ran = submission.run() => ran.map_err(UiError::from),
            }
        };

        if let Err(e) = &result {
            if !matches!(e, UiError::Interrupted(_)) {
                error!(error = %e, "TEM automation failed");
            }
        }
        if let Err(e) = browser.quit().await {
            warn!(error = %e, "Browser teardown reported an error");
        }
        result
    }
}
