//! TEM execution-job submission: form capabilities and the fixed step order.
//!
//! Step order matters: dropdown option lists only exist in the document
//! after their dropdown has been opened, and the test plan lookup grid only
//! after its trigger icon has been clicked.

use buildrelay_core::TemConfig;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::{wait_clickable, wait_present, Browser, ElementRef};
use crate::click::{resilient_click, UiTimeouts};
use crate::error::{BrowserResult, UiStepError};
use crate::locator::{xpath_literal, Locator};

/// Text of the message shown once TEM has queued the job.
pub const CONFIRMATION_TEXT: &str = "The job has been successfully queued";

/// Element ids and XPaths of the TEM UI.
pub mod tem {
    use super::*;

    pub const LOGIN_BUTTON: &str = "loginTaas";
    pub const EXECUTIONS_TAB: &str = "navManageExecution";
    pub const CREATE_JOB_BUTTON: &str = "executeTestPlan";
    pub const PLAN_SEARCH_INPUT: &str = "taas-lookup-datagrid-1-header-filter-1";
    pub const BASE_URL_OK_BUTTON: &str = "modal-button-1";
    pub const CONFIRMATION_OK_BUTTON: &str = "modal-button-3";

    /// Combobox following the form label `label`.
    pub fn dropdown(label: &str) -> Locator {
        Locator::xpath(format!(
            "//label[normalize-space()={}]/following::div[contains(@class,'dropdown') and @role='combobox'][1]",
            xpath_literal(label)
        ))
    }

    /// List option with exactly `text`.
    pub fn option(text: &str) -> Locator {
        Locator::xpath(format!("//li[normalize-space()={}]", xpath_literal(text)))
    }

    pub fn plan_lookup_trigger() -> Locator {
        Locator::xpath(
            "//label[normalize-space()='Test Execution Plan']/following::span[@class='trigger'][1]",
        )
    }

    /// Result grid cell showing the test plan `name`.
    pub fn plan_result(name: &str) -> Locator {
        Locator::xpath(format!("//td//div[normalize-space()={}]", xpath_literal(name)))
    }

    pub fn owner_email_input() -> Locator {
        Locator::xpath(
            "//label[normalize-space()='Environment Owner Email']/following::input[@formcontrolname='ownerEmailCtrl'][1]",
        )
    }

    pub fn submit_button() -> Locator {
        Locator::xpath("//button[span[normalize-space()='Submit']]")
    }

    pub fn confirmation() -> Locator {
        Locator::xpath(format!(
            "//span[contains(text(), {})]",
            xpath_literal(CONFIRMATION_TEXT)
        ))
    }
}

/// Form interactions the submission sequence is written against.
pub struct FormDriver<'a> {
    browser: &'a dyn Browser,
    timeouts: UiTimeouts,
}

impl<'a> FormDriver<'a> {
    pub fn new(browser: &'a dyn Browser, timeouts: UiTimeouts) -> Self {
        Self { browser, timeouts }
    }

    pub async fn click(&self, locator: &Locator, description: &str) -> BrowserResult<()> {
        resilient_click(self.browser, locator, description, self.timeouts).await
    }

    /// Open the combobox labelled `label`.
    pub async fn open_dropdown(&self, label: &str) -> BrowserResult<()> {
        self.click(&tem::dropdown(label), &format!("{label} dropdown"))
            .await
    }

    /// Choose the open list's option whose text is exactly `text`.
    pub async fn select_option(&self, label: &str, text: &str) -> BrowserResult<()> {
        self.click(&tem::option(text), &format!("{label} option '{text}'"))
            .await
    }

    /// Replace the content of the input at `locator` with `text`.
    pub async fn fill_text(&self, locator: &Locator, description: &str, text: &str) -> BrowserResult<()> {
        let element = self.await_element(locator, description, self.timeouts.element).await?;
        self.browser.clear_and_type(&element, text).await
    }

    /// Wait for `locator` to be present.
    pub async fn await_element(
        &self,
        locator: &Locator,
        description: &str,
        limit: Duration,
    ) -> BrowserResult<ElementRef> {
        wait_present(self.browser, locator, description, limit).await
    }

    pub async fn await_clickable(&self, locator: &Locator, description: &str) -> BrowserResult<ElementRef> {
        wait_clickable(self.browser, locator, description, self.timeouts.element).await
    }
}

/// One step of the submission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormStep {
    OpenApplication,
    Login,
    AwaitLogin,
    OpenExecutions,
    CreateJob,
    ScriptBranch,
    ScriptVersion,
    TestPlan,
    DismissBaseUrl,
    OwnerEmail,
    UsageType,
    Submit,
    AwaitConfirmation,
    DismissConfirmation,
}

impl FormStep {
    pub const SEQUENCE: [FormStep; 14] = [
        FormStep::OpenApplication,
        FormStep::Login,
        FormStep::AwaitLogin,
        FormStep::OpenExecutions,
        FormStep::CreateJob,
        FormStep::ScriptBranch,
        FormStep::ScriptVersion,
        FormStep::TestPlan,
        FormStep::DismissBaseUrl,
        FormStep::OwnerEmail,
        FormStep::UsageType,
        FormStep::Submit,
        FormStep::AwaitConfirmation,
        FormStep::DismissConfirmation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormStep::OpenApplication => "open application",
            FormStep::Login => "login",
            FormStep::AwaitLogin => "await login",
            FormStep::OpenExecutions => "open executions tab",
            FormStep::CreateJob => "create execution job",
            FormStep::ScriptBranch => "script branch",
            FormStep::ScriptVersion => "script version",
            FormStep::TestPlan => "test plan",
            FormStep::DismissBaseUrl => "dismiss base URL notice",
            FormStep::OwnerEmail => "environment owner email",
            FormStep::UsageType => "usage type",
            FormStep::Submit => "submit",
            FormStep::AwaitConfirmation => "await confirmation",
            FormStep::DismissConfirmation => "dismiss confirmation",
        }
    }

    /// Failure of these steps is logged, not fatal: the job is already submitted.
    pub fn is_best_effort(self) -> bool {
        matches!(
            self,
            FormStep::AwaitConfirmation | FormStep::DismissConfirmation
        )
    }
}

impl fmt::Display for FormStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a completed submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// The confirmation message was seen.
    pub confirmed: bool,
    pub steps_completed: Vec<FormStep>,
    /// Best-effort steps that failed, with the reason.
    pub warnings: Vec<String>,
}

/// Runs the fixed TEM submission sequence against a browser.
pub struct TemSubmission<'a> {
    form: FormDriver<'a>,
    tem: &'a TemConfig,
}

impl<'a> TemSubmission<'a> {
    pub fn new(browser: &'a dyn Browser, tem: &'a TemConfig, timeouts: UiTimeouts) -> Self {
        Self {
            form: FormDriver::new(browser, timeouts),
            tem,
        }
    }

    /// Run every step in order. The first failing required step ends the run.
    pub async fn run(&self) -> Result<SubmissionReport, UiStepError> {
        let mut report = SubmissionReport::default();

        for step in FormStep::SEQUENCE {
            if step == FormStep::AwaitConfirmation && !self.tem.await_confirmation {
                continue;
            }
            info!(step = %step, "UI step");
            match self.run_step(step).await {
                Ok(()) => {
                    if step == FormStep::AwaitConfirmation {
                        info!("Job successfully queued confirmation received");
                        report.confirmed = true;
                    }
                    report.steps_completed.push(step);
                }
                Err(cause) if step.is_best_effort() => {
                    warn!(step = %step, error = %cause, "Optional UI step failed");
                    report.warnings.push(format!("{step}: {cause}"));
                }
                Err(cause) => return Err(UiStepError { step, cause }),
            }
        }

        info!("TEM execution job submitted successfully");
        Ok(report)
    }

    async fn run_step(&self, step: FormStep) -> BrowserResult<()> {
        let form = &self.form;
        let config = self.tem;
        match step {
            FormStep::OpenApplication => form.browser.navigate(&config.base_url).await,
            FormStep::Login => {
                form.click(&Locator::id(tem::LOGIN_BUTTON), "Login button")
                    .await
            }
            FormStep::AwaitLogin => form
                .await_clickable(&Locator::id(tem::EXECUTIONS_TAB), "Executions tab")
                .await
                .map(|_| ()),
            FormStep::OpenExecutions => {
                form.click(&Locator::id(tem::EXECUTIONS_TAB), "Executions tab")
                    .await
            }
            FormStep::CreateJob => {
                form.click(&Locator::id(tem::CREATE_JOB_BUTTON), "Create Execution Job")
                    .await
            }
            FormStep::ScriptBranch => {
                form.open_dropdown("Script Branch").await?;
                form.select_option("Script Branch", &config.script_branch).await
            }
            FormStep::ScriptVersion => {
                form.open_dropdown("Script Version").await?;
                form.select_option("Script Version", &config.script_version)
                    .await
            }
            FormStep::TestPlan => {
                form.click(&tem::plan_lookup_trigger(), "Test Plan search icon")
                    .await?;
                form.fill_text(
                    &Locator::id(tem::PLAN_SEARCH_INPUT),
                    "Test Plan search input",
                    &config.test_plan_name,
                )
                .await?;
                form.click(&tem::plan_result(&config.test_plan_name), "Test Plan search result")
                    .await
            }
            FormStep::DismissBaseUrl => {
                form.click(&Locator::id(tem::BASE_URL_OK_BUTTON), "Base URL OK button")
                    .await
            }
            FormStep::OwnerEmail => {
                form.fill_text(
                    &tem::owner_email_input(),
                    "Environment Owner Email",
                    &config.environment_email,
                )
                .await
            }
            FormStep::UsageType => {
                form.open_dropdown("Usage Type").await?;
                form.select_option("Usage Type", &config.usage_type).await
            }
            FormStep::Submit => form.click(&tem::submit_button(), "Submit button").await,
            FormStep::AwaitConfirmation => form
                .await_element(&tem::confirmation(), "submission confirmation", form.timeouts.element)
                .await
                .map(|_| ()),
            FormStep::DismissConfirmation => {
                form.click(&Locator::id(tem::CONFIRMATION_OK_BUTTON), "OK button")
                    .await
            }
        }
    }
}
