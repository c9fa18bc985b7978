//! Build system API: the capability trait and its wire types.
//!
//! The JSON shapes follow the Jenkins remote access API (`.../api/json`).

use async_trait::async_trait;
use buildrelay_core::ExecutionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ApiError;

/// Result value Jenkins reports for a successful build.
pub const SUCCESS_RESULT: &str = "SUCCESS";

/// Raw outcome of a trigger request. Non-2xx statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    pub status: u16,
    /// Absolute queue item URL from the `Location` header, if any.
    pub location: Option<String>,
    pub body: String,
}

impl TriggerResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `GET queue/item/<id>/api/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    #[serde(default)]
    pub executable: Option<Executable>,
    /// Enqueue time in Unix epoch milliseconds.
    #[serde(default)]
    pub in_queue_since: Option<i64>,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl QueueItem {
    pub fn pending(in_queue_since: i64, why: Option<&str>) -> Self {
        Self {
            in_queue_since: Some(in_queue_since),
            why: why.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn started(number: u64, in_queue_since: i64) -> Self {
        Self {
            executable: Some(Executable { number, url: None }),
            in_queue_since: Some(in_queue_since),
            ..Self::default()
        }
    }

    /// The build this item turned into, once it left the queue.
    pub fn execution(&self) -> Option<ExecutionId> {
        self.executable
            .as_ref()
            .and_then(|e| ExecutionId::new(e.number))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executable {
    pub number: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// `GET queue/api/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueListing {
    #[serde(default)]
    pub items: Vec<QueueListingItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueListingItem {
    #[serde(default)]
    pub id: Option<u64>,
    /// Queue item URL; made absolute by the client.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub task: Option<QueueTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTask {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// `GET job/<name>/api/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default)]
    pub last_build: Option<BuildRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
}

/// `GET job/<name>/<number>/api/json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Missing means the server has not finished populating the build: still running.
    #[serde(default = "default_building")]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
}

fn default_building() -> bool {
    true
}

impl BuildStatus {
    pub fn running() -> Self {
        Self {
            building: true,
            result: None,
        }
    }

    pub fn finished(result: &str) -> Self {
        Self {
            building: false,
            result: Some(result.to_string()),
        }
    }
}

/// Remote build system operations used by the pipeline.
///
/// Inject [`crate::client::JenkinsClient`] in production or
/// [`crate::fakes::FakeBuildServer`] in tests.
#[async_trait]
pub trait BuildServer: Send + Sync {
    /// `POST buildWithParameters?{params}`
    async fn trigger(&self, params: &BTreeMap<String, String>) -> Result<TriggerResponse, ApiError>;

    /// Pending-queue listing for the whole server.
    async fn queue_listing(&self) -> Result<QueueListing, ApiError>;

    async fn job_info(&self) -> Result<JobInfo, ApiError>;

    /// Status of one queue item, by its absolute URL.
    async fn queue_item(&self, queue_url: &str) -> Result<QueueItem, ApiError>;

    async fn build_status(&self, execution: ExecutionId) -> Result<BuildStatus, ApiError>;

    /// Plain-text console log of a build.
    async fn console_text(&self, execution: ExecutionId) -> Result<String, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_item_pending_json() {
        let item: QueueItem = serde_json::from_str(
            r#"{"_class":"hudson.model.Queue$WaitingItem","inQueueSince":1700000000000,
                "why":"Waiting for next available executor","executable":null}"#,
        )
        .unwrap();
        assert_eq!(item.execution(), None);
        assert_eq!(item.in_queue_since, Some(1_700_000_000_000));
        assert!(!item.cancelled);
    }

    #[test]
    fn test_queue_item_started_json() {
        let item: QueueItem = serde_json::from_str(
            r#"{"inQueueSince":1700000000000,"executable":{"number":412,"url":"https://ci/job/x/412/"}}"#,
        )
        .unwrap();
        assert_eq!(item.execution(), ExecutionId::new(412));
    }

    #[test]
    fn test_build_status_defaults_to_building() {
        let status: BuildStatus = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert!(status.building);

        let status: BuildStatus =
            serde_json::from_str(r#"{"building":false,"result":"ABORTED"}"#).unwrap();
        assert!(!status.building);
        assert_eq!(status.result.as_deref(), Some("ABORTED"));
    }

    #[test]
    fn test_job_info_last_build() {
        let info: JobInfo =
            serde_json::from_str(r#"{"name":"x","lastBuild":{"number":99,"url":"u"}}"#).unwrap();
        assert_eq!(info.last_build.map(|b| b.number), Some(99));

        let info: JobInfo = serde_json::from_str(r#"{"lastBuild":null}"#).unwrap();
        assert!(info.last_build.is_none());
    }

    #[test]
    fn test_trigger_response_success_range() {
        let mut response = TriggerResponse {
            status: 201,
            location: None,
            body: String::new(),
        };
        assert!(response.is_success());
        response.status = 302;
        assert!(!response.is_success());
    }
}
