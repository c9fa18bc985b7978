//! Scriptable in-memory browser (testing only)
//!
//! Every locator matches a displayed, enabled element unless configured
//! otherwise; the busy overlay is absent by default. Clones share state, so a
//! test can hand one clone to the driver and inspect the other.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::browser::{Browser, ElementRef};
use crate::click::BUSY_INDICATOR;
use crate::driver::BrowserLauncher;
use crate::error::{BrowserError, BrowserResult};
use crate::locator::Locator;

/// A recorded browser action. Element actions carry the locator's display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    Click(String),
    ForceClick(String),
    Type { target: String, text: String },
    Quit,
}

/// How a scripted direct click is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Intercepted,
    NotInteractable,
    Stale,
}

impl Rejection {
    fn into_error(self, target: &str) -> BrowserError {
        match self {
            Rejection::Intercepted => BrowserError::ClickIntercepted(format!(
                "Other element would receive the click at {target}"
            )),
            Rejection::NotInteractable => BrowserError::NotInteractable(target.to_string()),
            Rejection::Stale => BrowserError::StaleElement(target.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    missing: HashSet<String>,
    /// Remaining `is_clickable` checks answering false; `None` = forever.
    unclickable: HashMap<String, Option<usize>>,
    /// Remaining lookups that still see the overlay; `None` = forever.
    busy_overlay: Option<Option<usize>>,
    rejections: HashMap<String, VecDeque<Rejection>>,
    failing_force: HashSet<String>,
    failing_navigation: bool,
    lost_session: bool,
    actions: Vec<Action>,
    quits: usize,
}

/// In-memory [`Browser`].
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<State>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// `locator` never matches anything.
    pub fn with_missing(self, locator: Locator) -> Self {
        self.edit(|s| {
            s.missing.insert(locator.to_string());
        })
    }

    /// `locator` matches, but is not clickable for the first `checks` checks.
    pub fn clickable_after(self, locator: Locator, checks: usize) -> Self {
        self.edit(|s| {
            s.unclickable.insert(locator.to_string(), Some(checks));
        })
    }

    /// `locator` matches but is never clickable.
    pub fn never_clickable(self, locator: Locator) -> Self {
        self.edit(|s| {
            s.unclickable.insert(locator.to_string(), None);
        })
    }

    /// Show the busy overlay for `lookups` lookups, or forever with `None`.
    pub fn with_busy_overlay(self, lookups: Option<usize>) -> Self {
        self.edit(|s| s.busy_overlay = Some(lookups))
    }

    /// Refuse the next direct clicks on `locator`, one rejection per click.
    pub fn reject_clicks(self, locator: Locator, rejections: Vec<Rejection>) -> Self {
        self.edit(|s| {
            s.rejections
                .entry(locator.to_string())
                .or_default()
                .extend(rejections);
        })
    }

    /// Forced clicks on `locator` fail.
    pub fn fail_force_click(self, locator: Locator) -> Self {
        self.edit(|s| {
            s.failing_force.insert(locator.to_string());
        })
    }

    pub fn with_failing_navigation(self) -> Self {
        self.edit(|s| s.failing_navigation = true)
    }

    /// Every lookup fails as if the WebDriver session had died.
    pub fn with_lost_session(self) -> Self {
        self.edit(|s| s.lost_session = true)
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Display forms of every element clicked, directly or forced, in order.
    pub fn clicked(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Click(target) | Action::ForceClick(target) => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn force_clicks(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, Action::ForceClick(_)))
            .count()
    }

    pub fn quit_count(&self) -> usize {
        self.state.lock().unwrap().quits
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::Navigate(url.to_string()));
        if state.failing_navigation {
            return Err(BrowserError::WebDriver {
                error: "unknown error".to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();

        if state.lost_session {
            return Err(BrowserError::WebDriver {
                error: "invalid session id".to_string(),
                message: "session deleted because of page crash".to_string(),
            });
        }
        if key == BUSY_INDICATOR {
            return Ok(match &mut state.busy_overlay {
                None => None,
                Some(None) => Some(ElementRef(key)),
                Some(Some(0)) => None,
                Some(Some(remaining)) => {
                    *remaining -= 1;
                    Some(ElementRef(key))
                }
            });
        }
        if state.missing.contains(&key) {
            return Ok(None);
        }
        Ok(Some(ElementRef(key)))
    }

    async fn is_clickable(&self, element: &ElementRef) -> BrowserResult<bool> {
        let mut state = self.state.lock().unwrap();
        Ok(match state.unclickable.get_mut(&element.0) {
            None => true,
            Some(None) => false,
            Some(Some(0)) => true,
            Some(Some(remaining)) => {
                *remaining -= 1;
                false
            }
        })
    }

    async fn click(&self, element: &ElementRef) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::Click(element.0.clone()));
        let rejection = state
            .rejections
            .get_mut(&element.0)
            .and_then(VecDeque::pop_front);
        match rejection {
            Some(rejection) => Err(rejection.into_error(&element.0)),
            None => Ok(()),
        }
    }

    async fn force_click(&self, element: &ElementRef) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::ForceClick(element.0.clone()));
        if state.failing_force.contains(&element.0) {
            return Err(BrowserError::WebDriver {
                error: "javascript error".to_string(),
                message: "element is detached".to_string(),
            });
        }
        Ok(())
    }

    async fn clear_and_type(&self, element: &ElementRef, text: &str) -> BrowserResult<()> {
        self.state.lock().unwrap().actions.push(Action::Type {
            target: element.0.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn quit(&self) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::Quit);
        state.quits += 1;
        Ok(())
    }
}

/// Launcher handing out clones of one [`FakeBrowser`], or failing.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    browser: Result<FakeBrowser, String>,
}

impl FakeLauncher {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser: Ok(browser),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            browser: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>> {
        match &self.browser {
            Ok(browser) => Ok(Box::new(browser.clone())),
            Err(message) => Err(BrowserError::Transport(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_match_everything_but_the_overlay() {
        let browser = FakeBrowser::new();
        assert!(browser.find(&Locator::id("x")).await.unwrap().is_some());
        assert!(browser
            .find(&Locator::css(BUSY_INDICATOR))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let browser = FakeBrowser::new();
        let handle = browser.clone();
        browser.quit().await.unwrap();
        assert_eq!(handle.quit_count(), 1);
        assert_eq!(handle.actions(), vec![Action::Quit]);
    }
}
