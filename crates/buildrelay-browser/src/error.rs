//! Error types for browser automation.

use buildrelay_core::Interrupted;
use std::time::Duration;
use thiserror::Error;

use crate::form::FormStep;

/// Errors from a single browser operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// A bounded wait expired.
    #[error("timed out after {}s waiting for {what}", .waited.as_secs())]
    Timeout { what: String, waited: Duration },

    /// Another element would receive the click.
    #[error("click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    /// The element was removed from the document after it was found.
    #[error("stale element: {0}")]
    StaleElement(String),

    /// Any other error reported by the WebDriver server.
    #[error("webdriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    /// The WebDriver server could not be reached or answered garbage.
    #[error("webdriver transport error: {0}")]
    Transport(String),

    /// The chromedriver process could not be started.
    #[error("chromedriver: {0}")]
    Process(String),
}

impl BrowserError {
    /// The direct click was refused in a way a forced click can work around.
    pub fn is_click_rejection(&self) -> bool {
        matches!(
            self,
            BrowserError::ClickIntercepted(_) | BrowserError::NotInteractable(_)
        )
    }

    /// The element is not (or no longer) in the document; waits keep polling.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            BrowserError::NoSuchElement(_) | BrowserError::StaleElement(_)
        )
    }

    /// Map a W3C WebDriver error code to a variant.
    pub fn from_wire(error: &str, message: &str) -> Self {
        let message = message.to_string();
        match error {
            "element click intercepted" => BrowserError::ClickIntercepted(message),
            "element not interactable" => BrowserError::NotInteractable(message),
            "no such element" => BrowserError::NoSuchElement(message),
            "stale element reference" => BrowserError::StaleElement(message),
            other => BrowserError::WebDriver {
                error: other.to_string(),
                message,
            },
        }
    }
}

/// A step of the submission sequence failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("UI step '{step}' failed: {cause}")]
pub struct UiStepError {
    pub step: FormStep,
    pub cause: BrowserError,
}

/// Why the UI automation did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UiError {
    #[error("could not start browser session: {0}")]
    Launch(BrowserError),

    #[error(transparent)]
    Step(#[from] UiStepError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
