//! Fun facts shown during long waits.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

const USELESS_FACTS_URL: &str = "https://uselessfacts.jsph.pl/api/v2/facts/random?language=en";

const FALLBACK_FACTS: &[&str] = &[
    "The first computer bug was an actual moth stuck in a relay.",
    "Email existed before the World Wide Web.",
    "The first 1GB hard drive (1980) weighed over 500 pounds.",
];

/// Source of a one-line fact. Never fails; implementations fall back.
#[async_trait]
pub trait FactSource: Send + Sync {
    async fn fact(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct FactResponse {
    text: Option<String>,
}

/// Facts from the uselessfacts API, with a built-in list as fallback.
pub struct UselessFactsApi {
    client: reqwest::Client,
    url: String,
    next_fallback: AtomicUsize,
}

impl UselessFactsApi {
    pub fn new() -> Self {
        Self::with_url(USELESS_FACTS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            next_fallback: AtomicUsize::new(0),
        }
    }

    fn fallback(&self) -> String {
        let idx = self.next_fallback.fetch_add(1, Ordering::Relaxed);
        FALLBACK_FACTS[idx % FALLBACK_FACTS.len()].to_string()
    }

    async fn fetch(&self) -> Result<Option<String>, reqwest::Error> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let body: FactResponse = response.json().await?;
        Ok(body.text.filter(|t| !t.trim().is_empty()))
    }
}

impl Default for UselessFactsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactSource for UselessFactsApi {
    async fn fact(&self) -> String {
        match self.fetch().await {
            Ok(Some(text)) => text,
            Ok(None) => "Coding is 10% writing and 90% debugging.".to_string(),
            Err(e) => {
                debug!(error = %e, "Fact lookup failed");
                self.fallback()
            }
        }
    }
}
