//! buildrelay browser automation
//!
//! A small W3C WebDriver client, the resilient click primitive and the
//! fixed TEM execution-job submission sequence.

pub mod browser;
pub mod chromedriver;
pub mod click;
pub mod driver;
pub mod error;
pub mod fakes;
pub mod form;
pub mod locator;
pub mod webdriver;

pub use browser::{wait_absent, wait_clickable, wait_present, Browser, ElementRef};
pub use chromedriver::ChromeDriverProcess;
pub use click::{resilient_click, UiTimeouts, BUSY_INDICATOR};
pub use driver::{BrowserLauncher, ChromeLauncher, UiAutomationDriver};
pub use error::{BrowserError, BrowserResult, UiError, UiStepError};
pub use form::{FormDriver, FormStep, SubmissionReport, TemSubmission};
pub use locator::{xpath_literal, Locator};
pub use webdriver::WebDriverSession;
