//! Build trigger and tracking-handle resolution.
//!
//! Jenkins does not reliably return a queue location for a triggered build,
//! so the handle is resolved through a fixed chain of strategies:
//! 1. the `Location` header of the trigger response
//! 2. the first pending-queue entry whose task is our job
//! 3. the job's last known build number (low confidence)

use buildrelay_core::{BuildHandle, ExecutionId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{BuildServer, QueueListing};
use crate::client::job_path;
use crate::error::TriggerError;

/// Triggers the configured job and resolves a [`BuildHandle`] for it.
pub struct BuildTrigger {
    server: Arc<dyn BuildServer>,
    job_name: String,
}

impl BuildTrigger {
    pub fn new(server: Arc<dyn BuildServer>, job_name: impl Into<String>) -> Self {
        Self {
            server,
            job_name: job_name.into(),
        }
    }

    /// Request a build with `params` and resolve its tracking handle.
    ///
    /// Fallback strategies only run when the response carried no location.
    pub async fn trigger_build(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<BuildHandle, TriggerError> {
        info!(job = %self.job_name, "Triggering build");
        let response = self.server.trigger(params).await?;

        if !response.is_success() {
            error!(status = response.status, body = %response.body, "Failed to trigger build");
            return Err(TriggerError::Rejected {
                status: response.status,
                body: response.body,
            });
        }
        info!(status = response.status, "Build triggered successfully");

        if let Some(location) = response.location {
            info!(queue_url = %location, "Build queued");
            return Ok(BuildHandle::from_trigger_response(location));
        }

        warn!("Build system did not return a queue URL; checking the queue listing");
        match self.server.queue_listing().await {
            Ok(listing) => {
                if let Some(url) = self.find_queued(&listing) {
                    info!(queue_url = %url, "Found queued item");
                    return Ok(BuildHandle::from_queue_listing(url));
                }
            }
            Err(e) => warn!(error = %e, "Queue lookup failed"),
        }

        match self.server.job_info().await {
            Ok(info) => {
                if let Some(execution) = info
                    .last_build
                    .and_then(|build| ExecutionId::new(build.number))
                {
                    warn!(
                        build = %execution,
                        "Falling back to last known build (may not be your run)"
                    );
                    return Ok(BuildHandle::from_last_known_build(execution));
                }
            }
            Err(e) => warn!(error = %e, "Failed to fetch last build"),
        }

        error!("No tracking handle could be resolved for the triggered build");
        Err(TriggerError::NoHandle)
    }

    /// URL of the first queue entry whose task is this job.
    fn find_queued(&self, listing: &QueueListing) -> Option<String> {
        let path = job_path(&self.job_name);
        let wanted = format!("/{}", path.trim_end_matches('/'));
        let leaf = self.job_name.rsplit('/').find(|s| !s.is_empty());

        listing
            .items
            .iter()
            .find(|item| {
                item.task.as_ref().is_some_and(|task| match &task.url {
                    Some(url) => url.trim_end_matches('/').ends_with(&wanted),
                    None => task.name.as_deref() == leaf,
                })
            })
            .and_then(|item| item.url.clone())
    }
}
