//! Browser capability trait and bounded waits built on it.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BrowserError, BrowserResult};
use crate::locator::Locator;

/// Interval between condition checks in the bounded waits.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Opaque reference to an element found in the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Primitive browser operations.
///
/// Implemented by [`crate::webdriver::WebDriverSession`] and, for tests,
/// [`crate::fakes::FakeBrowser`].
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// The first matching element, or `None` when nothing matches.
    async fn find(&self, locator: &Locator) -> BrowserResult<Option<ElementRef>>;

    /// Displayed and enabled.
    async fn is_clickable(&self, element: &ElementRef) -> BrowserResult<bool>;

    /// Native click.
    async fn click(&self, element: &ElementRef) -> BrowserResult<()>;

    /// Scroll the element into view and click it from script, bypassing
    /// overlap and interactability checks.
    async fn force_click(&self, element: &ElementRef) -> BrowserResult<()>;

    async fn clear_and_type(&self, element: &ElementRef, text: &str) -> BrowserResult<()>;

    /// End the session and release the browser.
    async fn quit(&self) -> BrowserResult<()>;
}

async fn find_quietly(browser: &dyn Browser, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
    match browser.find(locator).await {
        Err(e) if e.is_lookup_miss() => Ok(None),
        other => other,
    }
}

fn timeout(what: &str, waited: Duration) -> BrowserError {
    BrowserError::Timeout {
        what: what.to_string(),
        waited,
    }
}

/// Wait until `locator` matches an element.
pub async fn wait_present(
    browser: &dyn Browser,
    locator: &Locator,
    what: &str,
    limit: Duration,
) -> BrowserResult<ElementRef> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(element) = find_quietly(browser, locator).await? {
            return Ok(element);
        }
        if Instant::now() >= deadline {
            return Err(timeout(what, limit));
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

/// Wait until nothing matches `locator`.
pub async fn wait_absent(
    browser: &dyn Browser,
    locator: &Locator,
    what: &str,
    limit: Duration,
) -> BrowserResult<()> {
    let deadline = Instant::now() + limit;
    loop {
        if find_quietly(browser, locator).await?.is_none() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(timeout(what, limit));
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

/// Wait until `locator` matches an element that is displayed and enabled.
pub async fn wait_clickable(
    browser: &dyn Browser,
    locator: &Locator,
    what: &str,
    limit: Duration,
) -> BrowserResult<ElementRef> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(element) = find_quietly(browser, locator).await? {
            match browser.is_clickable(&element).await {
                Ok(true) => return Ok(element),
                Ok(false) => debug!(element = what, "Present but not clickable yet"),
                Err(e) if e.is_lookup_miss() => {}
                Err(e) => return Err(e),
            }
        }
        if Instant::now() >= deadline {
            return Err(timeout(what, limit));
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}
