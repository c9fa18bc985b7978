//! Resilient click: direct click with a single forced fallback.

use buildrelay_core::WebDriverConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{wait_absent, wait_clickable, Browser};
use crate::error::{BrowserError, BrowserResult};
use crate::locator::Locator;

/// Overlay the application shows while it is processing.
pub const BUSY_INDICATOR: &str = ".busy-indicator.active";

/// Bounds for the waits inside UI interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiTimeouts {
    /// Waiting for an element to appear or become clickable.
    pub element: Duration,
    /// Waiting for the busy overlay to clear.
    pub busy: Duration,
}

impl Default for UiTimeouts {
    fn default() -> Self {
        Self::from(&WebDriverConfig::default())
    }
}

impl From<&WebDriverConfig> for UiTimeouts {
    fn from(config: &WebDriverConfig) -> Self {
        Self {
            element: Duration::from_secs(config.element_timeout_secs),
            busy: Duration::from_secs(config.busy_timeout_secs),
        }
    }
}

/// Click `locator` once the page is idle and the element is clickable.
///
/// A busy overlay that never clears is logged and ignored; any other error
/// while waiting for it fails the step. If the direct
/// click is intercepted or the element is not interactable, exactly one
/// forced click follows; its error is the step's error.
pub async fn resilient_click(
    browser: &dyn Browser,
    locator: &Locator,
    description: &str,
    timeouts: UiTimeouts,
) -> BrowserResult<()> {
    let overlay = Locator::css(BUSY_INDICATOR);
    match wait_absent(browser, &overlay, "busy indicator", timeouts.busy).await {
        Ok(()) => debug!("Busy indicator cleared"),
        Err(e @ BrowserError::Timeout { .. }) => {
            warn!(error = %e, "Busy indicator still present, proceeding anyway")
        }
        Err(e) => return Err(e),
    }

    let element = wait_clickable(browser, locator, description, timeouts.element).await?;

    match browser.click(&element).await {
        Ok(()) => {
            info!("Clicked {description}");
            Ok(())
        }
        Err(e) if e.is_click_rejection() => {
            warn!(error = %e, "Normal click failed on {description}, forcing it");
            browser.force_click(&element).await?;
            info!("Force-clicked {description}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Action, FakeBrowser, Rejection};

    fn target() -> Locator {
        Locator::id("executeTestPlan")
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_click() {
        let browser = FakeBrowser::new();
        resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
            .await
            .unwrap();
        assert_eq!(browser.actions(), vec![Action::Click(target().to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interception_is_followed_by_exactly_one_forced_click() {
        for rejection in [Rejection::Intercepted, Rejection::NotInteractable] {
            let browser = FakeBrowser::new().reject_clicks(target(), vec![rejection]);
            resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
                .await
                .unwrap();
            assert_eq!(
                browser.actions(),
                vec![
                    Action::Click(target().to_string()),
                    Action::ForceClick(target().to_string()),
                ]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_click_failure_fails_the_step() {
        let browser = FakeBrowser::new()
            .reject_clicks(target(), vec![Rejection::Intercepted])
            .fail_force_click(target());
        let err = resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::WebDriver { .. }));
        assert_eq!(browser.force_clicks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_click_errors_are_not_forced() {
        let browser = FakeBrowser::new().reject_clicks(target(), vec![Rejection::Stale]);
        let err = resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::StaleElement(_)));
        assert_eq!(browser.force_clicks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_busy_overlay_is_not_fatal() {
        let browser = FakeBrowser::new().with_busy_overlay(None);
        let timeouts = UiTimeouts {
            element: Duration::from_secs(30),
            busy: Duration::from_secs(2),
        };
        resilient_click(&browser, &target(), "Create Execution Job", timeouts)
            .await
            .unwrap();
        assert_eq!(browser.actions(), vec![Action::Click(target().to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_session_during_overlay_wait_fails_the_step() {
        let browser = FakeBrowser::new().with_lost_session();
        let err = resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrowserError::WebDriver { ref error, .. } if error == "invalid session id"
        ));
        assert!(browser.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclickable_element_times_out() {
        let browser = FakeBrowser::new().never_clickable(target());
        let err = resilient_click(&browser, &target(), "Create Execution Job", UiTimeouts::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BrowserError::Timeout {
                what: "Create Execution Job".to_string(),
                waited: Duration::from_secs(30),
            }
        );
        assert!(browser.actions().is_empty());
    }
}
