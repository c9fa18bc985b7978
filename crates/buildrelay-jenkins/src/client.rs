//! Jenkins HTTP client
//!
//! Implements [`BuildServer`] against the Jenkins remote access API using
//! HTTP basic auth with a user API token.

use async_trait::async_trait;
use buildrelay_core::{ExecutionId, JenkinsConfig};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::api::{BuildServer, BuildStatus, JobInfo, QueueItem, QueueListing, TriggerResponse};
use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// URL path of a (possibly foldered) job relative to the server root,
/// e.g. `team/integration` -> `job/team/job/integration/`.
pub fn job_path(job_name: &str) -> String {
    job_name
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("job/{segment}/"))
        .collect()
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Jenkins client for one job.
pub struct JenkinsClient {
    http: reqwest::Client,
    base_url: Url,
    job_url: Url,
    username: String,
    api_token: String,
}

impl JenkinsClient {
    /// Create a client from configuration.
    pub fn new(config: &JenkinsConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&with_trailing_slash(&config.base_url))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        let job_url = base_url
            .join(&job_path(&config.job_name))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.job_name)))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("buildrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            job_url,
            username: config.username.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn job_url(&self) -> &Url {
        &self.job_url
    }

    /// Resolve a possibly relative location against the server root.
    pub fn resolve(&self, location: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(location)
            .map_err(|e| ApiError::InvalidUrl(format!("{location}: {e}")))
    }

    fn job_endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.job_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ApiError> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.get(url.clone()).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn transport(url: &Url, err: reqwest::Error) -> ApiError {
    ApiError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl BuildServer for JenkinsClient {
    async fn trigger(&self, params: &BTreeMap<String, String>) -> Result<TriggerResponse, ApiError> {
        let url = self.job_endpoint("buildWithParameters")?;
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(url.clone())
            .basic_auth(&self.username, Some(&self.api_token))
            .query(params)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| self.resolve(value).map(|u| u.to_string()))
            .transpose()?;
        let body = response.text().await.unwrap_or_default();

        Ok(TriggerResponse {
            status,
            location,
            body,
        })
    }

    async fn queue_listing(&self) -> Result<QueueListing, ApiError> {
        let url = self.resolve("queue/api/json")?;
        let mut listing: QueueListing = self.get_json(url).await?;
        for item in &mut listing.items {
            if let Some(relative) = item.url.take() {
                item.url = Some(self.resolve(&relative)?.to_string());
            }
        }
        Ok(listing)
    }

    async fn job_info(&self) -> Result<JobInfo, ApiError> {
        let url = self.job_endpoint("api/json")?;
        self.get_json(url).await
    }

    async fn queue_item(&self, queue_url: &str) -> Result<QueueItem, ApiError> {
        let url = self.resolve(&format!("{}api/json", with_trailing_slash(queue_url)))?;
        self.get_json(url).await
    }

    async fn build_status(&self, execution: ExecutionId) -> Result<BuildStatus, ApiError> {
        let url = self.job_endpoint(&format!("{}/api/json", execution.number()))?;
        self.get_json(url).await
    }

    async fn console_text(&self, execution: ExecutionId) -> Result<String, ApiError> {
        let url = self.job_endpoint(&format!("{}/consoleText", execution.number()))?;
        let response = self.get(url.clone()).await?;
        response.text().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, job_name: &str) -> JenkinsConfig {
        JenkinsConfig {
            base_url: base_url.to_string(),
            username: "bot".to_string(),
            api_token: "token".to_string(),
            job_name: job_name.to_string(),
            parameter: None,
        }
    }

    #[test]
    fn test_job_path_handles_folders() {
        assert_eq!(job_path("integration"), "job/integration/");
        assert_eq!(job_path("team/integration"), "job/team/job/integration/");
        assert_eq!(job_path("/team//integration/"), "job/team/job/integration/");
    }

    #[test]
    fn test_job_url_from_config() {
        let client = JenkinsClient::new(&config("https://ci.example.com", "team/it")).unwrap();
        assert_eq!(
            client.job_url().as_str(),
            "https://ci.example.com/job/team/job/it/"
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let client = JenkinsClient::new(&config("https://ci.example.com/jenkins/", "it")).unwrap();
        assert_eq!(
            client.resolve("queue/item/5/").unwrap().as_str(),
            "https://ci.example.com/jenkins/queue/item/5/"
        );
        assert_eq!(
            client
                .resolve("https://other.example.com/queue/item/6/")
                .unwrap()
                .as_str(),
            "https://other.example.com/queue/item/6/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = JenkinsClient::new(&config("not a url", "it")).err().unwrap();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = JenkinsClient::new(&config("http://127.0.0.1:9/", "it")).unwrap();
        let err = client.job_info().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
    }
}
