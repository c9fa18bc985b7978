//! In-memory build server (testing only)
//!
//! `FakeBuildServer` replays scripted responses so the trigger, queue and
//! completion stages can be driven deterministically under paused time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use buildrelay_core::ExecutionId;

use crate::api::{BuildServer, BuildStatus, JobInfo, QueueItem, QueueListing, TriggerResponse};
use crate::error::ApiError;

/// Number of calls made to each endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub trigger: usize,
    pub queue_listing: usize,
    pub job_info: usize,
    pub queue_item: usize,
    pub build_status: usize,
    pub console_text: usize,
}

/// Scripted responses; each entry is returned `times` times, the last one forever.
#[derive(Debug)]
struct Script<T> {
    steps: VecDeque<(Result<T, ApiError>, usize)>,
    fallback: Result<T, ApiError>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: Ok(fallback),
        }
    }

    fn push(&mut self, response: Result<T, ApiError>, times: usize) {
        if times > 0 {
            self.steps.push_back((response, times));
        }
    }

    fn next(&mut self) -> Result<T, ApiError> {
        let Some((response, remaining)) = self.steps.front_mut() else {
            return self.fallback.clone();
        };
        let out = response.clone();
        *remaining -= 1;
        if *remaining == 0 {
            if let Some((last, _)) = self.steps.pop_front() {
                self.fallback = last;
            }
        }
        out
    }
}

fn transport(message: &str) -> ApiError {
    ApiError::Transport {
        url: "fake://build-server".to_string(),
        message: message.to_string(),
    }
}

#[derive(Debug)]
struct State {
    trigger: Result<TriggerResponse, ApiError>,
    queue_listing: Result<QueueListing, ApiError>,
    job_info: Result<JobInfo, ApiError>,
    queue_polls: Script<QueueItem>,
    build_polls: Script<BuildStatus>,
    console: Result<String, ApiError>,
    calls: CallCounts,
    trigger_params: Option<BTreeMap<String, String>>,
    queue_urls: Vec<String>,
    polled_builds: Vec<ExecutionId>,
}

/// Build server replaying scripted responses.
///
/// Unscripted endpoints answer benignly: `201` without a location, an empty
/// queue listing, no last build, a queue item that never starts, a build that
/// never finishes and an empty console.
#[derive(Debug)]
pub struct FakeBuildServer {
    state: Mutex<State>,
}

impl Default for FakeBuildServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBuildServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                trigger: Ok(TriggerResponse {
                    status: 201,
                    location: None,
                    body: String::new(),
                }),
                queue_listing: Ok(QueueListing::default()),
                job_info: Ok(JobInfo::default()),
                queue_polls: Script::new(QueueItem::default()),
                build_polls: Script::new(BuildStatus::running()),
                console: Ok(String::new()),
                calls: CallCounts::default(),
                trigger_params: None,
                queue_urls: Vec::new(),
                polled_builds: Vec::new(),
            }),
        }
    }

    fn edit(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_trigger(self, status: u16, location: Option<&str>) -> Self {
        self.edit(|s| {
            s.trigger = Ok(TriggerResponse {
                status,
                location: location.map(str::to_string),
                body: if (200..300).contains(&status) {
                    String::new()
                } else {
                    format!("HTTP {status}")
                },
            })
        })
    }

    pub fn with_failing_trigger(self, message: &str) -> Self {
        self.edit(|s| s.trigger = Err(transport(message)))
    }

    pub fn with_queue_listing(self, listing: QueueListing) -> Self {
        self.edit(|s| s.queue_listing = Ok(listing))
    }

    pub fn with_failing_queue_listing(self, message: &str) -> Self {
        self.edit(|s| s.queue_listing = Err(transport(message)))
    }

    pub fn with_job_info(self, info: JobInfo) -> Self {
        self.edit(|s| s.job_info = Ok(info))
    }

    pub fn with_failing_job_info(self, message: &str) -> Self {
        self.edit(|s| s.job_info = Err(transport(message)))
    }

    /// Answer the next `times` queue item polls with `response`.
    pub fn push_queue_poll(self, response: Result<QueueItem, ApiError>, times: usize) -> Self {
        self.edit(|s| s.queue_polls.push(response, times))
    }

    /// Answer the next `times` build status polls with `response`.
    pub fn push_build_poll(self, response: Result<BuildStatus, ApiError>, times: usize) -> Self {
        self.edit(|s| s.build_polls.push(response, times))
    }

    pub fn with_console(self, text: &str) -> Self {
        self.edit(|s| s.console = Ok(text.to_string()))
    }

    pub fn with_failing_console(self, message: &str) -> Self {
        self.edit(|s| s.console = Err(transport(message)))
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    /// Parameters of the most recent trigger request.
    pub fn last_trigger_params(&self) -> Option<BTreeMap<String, String>> {
        self.state.lock().unwrap().trigger_params.clone()
    }

    /// Queue item URLs polled so far, in order.
    pub fn queue_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().queue_urls.clone()
    }

    /// Builds whose status was polled, in order.
    pub fn polled_builds(&self) -> Vec<ExecutionId> {
        self.state.lock().unwrap().polled_builds.clone()
    }

    /// A transport error, for scripting failed polls.
    pub fn transport_error(message: &str) -> ApiError {
        transport(message)
    }
}

#[async_trait]
impl BuildServer for FakeBuildServer {
    async fn trigger(&self, params: &BTreeMap<String, String>) -> Result<TriggerResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.trigger += 1;
        state.trigger_params = Some(params.clone());
        state.trigger.clone()
    }

    async fn queue_listing(&self) -> Result<QueueListing, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.queue_listing += 1;
        state.queue_listing.clone()
    }

    async fn job_info(&self) -> Result<JobInfo, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.job_info += 1;
        state.job_info.clone()
    }

    async fn queue_item(&self, queue_url: &str) -> Result<QueueItem, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.queue_item += 1;
        state.queue_urls.push(queue_url.to_string());
        state.queue_polls.next()
    }

    async fn build_status(&self, execution: ExecutionId) -> Result<BuildStatus, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.build_status += 1;
        state.polled_builds.push(execution);
        state.build_polls.next()
    }

    async fn console_text(&self, _execution: ExecutionId) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.console_text += 1;
        state.console.clone()
    }
}
