//! buildrelay Jenkins integration
//!
//! Triggers the configured job, resolves the queued item to a build number
//! and watches the build until it finishes.

pub mod api;
pub mod client;
pub mod error;
pub mod fakes;
pub mod polling;
pub mod queue;
pub mod trigger;
pub mod watcher;

pub use api::{
    BuildServer, BuildStatus, JobInfo, QueueItem, QueueListing, TriggerResponse, SUCCESS_RESULT,
};
pub use client::{job_path, JenkinsClient};
pub use error::{ApiError, BuildFailure, QueueError, TriggerError};
pub use polling::{BucketNotifier, IntervalNotifier};
pub use queue::{QueueResolver, QueueSettings};
pub use trigger::BuildTrigger;
pub use watcher::{classify, console_tail, Completion, CompletionWatcher, WatchSettings};
