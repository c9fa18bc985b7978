//! Pipeline configuration.
//!
//! Loaded once from a JSON file and passed explicitly into every component.
//! Credentials can be overridden from the environment so the file does not
//! need to hold a live API token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::ConfigError;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "buildrelay.json";

/// Default marker file name, placed next to the config file.
pub const DEFAULT_MARKER_FILE: &str = ".last_processed_commit";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub jenkins: JenkinsConfig,
    pub tem: TemConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Marker file location. Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub marker_path: Option<PathBuf>,
    /// Attach a fun fact to long-wait progress notifications.
    #[serde(default = "default_true")]
    pub fun_facts: bool,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Build system connection and job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JenkinsConfig {
    /// Server root URL, e.g. `https://jenkins.example.com/`.
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
    /// Full job name; folders are separated by `/`.
    pub job_name: String,
    /// Build parameter passed to `buildWithParameters`.
    pub parameter: Option<JobParameter>,
}

/// One build parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobParameter {
    pub name: String,
    pub value: String,
}

/// Target web application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemConfig {
    pub base_url: String,
    pub test_plan_name: String,
    pub environment_email: String,
    #[serde(default = "default_usage_type")]
    pub usage_type: String,
    #[serde(default = "default_script_branch")]
    pub script_branch: String,
    #[serde(default = "default_script_version")]
    pub script_version: String,
    /// Wait for the "successfully queued" message after submitting.
    #[serde(default = "default_true")]
    pub await_confirmation: bool,
}

/// WebDriver endpoint and browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// Endpoint of an already running WebDriver server.
    pub url: String,
    /// When set, chromedriver is spawned for the session instead of using `url`.
    pub chromedriver_path: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub element_timeout_secs: u64,
    pub busy_timeout_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            chromedriver_path: None,
            headless: true,
            window_size: (1920, 1080),
            element_timeout_secs: 30,
            busy_timeout_secs: 30,
        }
    }
}

/// Tracked repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub dir: PathBuf,
    pub remote: String,
    pub branch: String,
    /// Substrings one of which the remote URL must contain. Empty disables the check.
    pub expected_identifiers: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "master".to_string(),
            expected_identifiers: Vec::new(),
        }
    }
}

/// Polling cadence and limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub queue_interval_secs: u64,
    pub queue_timeout_secs: u64,
    pub queue_notify_every_secs: u64,
    pub build_interval_secs: u64,
    pub build_timeout_secs: u64,
    pub build_notify_every_secs: u64,
    pub log_tail_lines: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            queue_interval_secs: 10,
            queue_timeout_secs: 2 * 60 * 60,
            queue_notify_every_secs: 15 * 60,
            build_interval_secs: 60,
            build_timeout_secs: 3 * 60 * 60,
            build_notify_every_secs: 15 * 60,
            log_tail_lines: 20,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_usage_type() -> String {
    "QA".to_string()
}

fn default_script_branch() -> String {
    "release_1.0.0".to_string()
}

fn default_script_version() -> String {
    "11.0-SNAPSHOT".to_string()
}

impl JenkinsConfig {
    /// Parameters for the trigger request.
    pub fn build_params(&self) -> BTreeMap<String, String> {
        self.parameter
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a JSON string (no environment overrides).
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Override credentials from `BUILDRELAY_JENKINS_USER` / `BUILDRELAY_JENKINS_TOKEN`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var("BUILDRELAY_JENKINS_USER") {
            self.jenkins.username = user;
        }
        if let Ok(token) = std::env::var("BUILDRELAY_JENKINS_TOKEN") {
            self.jenkins.api_token = token;
        }
    }

    /// Reject configurations that cannot drive a pipeline run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("jenkins.base_url", &self.jenkins.base_url),
            ("jenkins.username", &self.jenkins.username),
            ("jenkins.api_token", &self.jenkins.api_token),
            ("jenkins.job_name", &self.jenkins.job_name),
            ("tem.base_url", &self.tem.base_url),
            ("tem.test_plan_name", &self.tem.test_plan_name),
            ("tem.environment_email", &self.tem.environment_email),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        if let Some(param) = &self.jenkins.parameter {
            if param.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "jenkins.parameter.name must not be empty".to_string(),
                ));
            }
        }
        if self.polling.queue_interval_secs == 0 || self.polling.build_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved marker file path.
    pub fn marker_path(&self) -> PathBuf {
        match &self.marker_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.base_dir.join(path),
            None => self.base_dir.join(DEFAULT_MARKER_FILE),
        }
    }
}

/// Example configuration printed by `buildrelay setup`.
pub fn example_config() -> String {
    let example = serde_json::json!({
        "jenkins": {
            "base_url": "https://jenkins.example.com/",
            "username": "jdoe",
            "api_token": "<api token>",
            "job_name": "integration/testscripts",
            "parameter": { "name": "CSF_SOHO_VERSION", "value": "11.0" }
        },
        "tem": {
            "base_url": "https://tem.example.com/",
            "test_plan_name": "Nightly Regression",
            "environment_email": "jdoe@example.com",
            "usage_type": default_usage_type(),
            "script_branch": default_script_branch(),
            "script_version": default_script_version()
        },
        "repository": {
            "remote": "origin",
            "branch": "master",
            "expected_identifiers": ["integration-testscripts"]
        }
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "jenkins": {
            "base_url": "https://ci.example.com/",
            "username": "bot",
            "api_token": "secret",
            "job_name": "team/integration",
            "parameter": { "name": "VERSION", "value": "11.0" }
        },
        "tem": {
            "base_url": "https://tem.example.com/",
            "test_plan_name": "Smoke",
            "environment_email": "qa@example.com"
        }
    }"#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = RelayConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.tem.usage_type, "QA");
        assert_eq!(config.tem.script_branch, "release_1.0.0");
        assert!(config.tem.await_confirmation);
        assert_eq!(config.webdriver.url, "http://localhost:9515");
        assert_eq!(config.repository.branch, "master");
        assert_eq!(config.polling.queue_interval_secs, 10);
        assert_eq!(config.polling.queue_timeout_secs, 7200);
        assert_eq!(config.polling.log_tail_lines, 20);
        assert!(config.fun_facts);
        config.validate().unwrap();
    }

    #[test]
    fn test_build_params() {
        let config = RelayConfig::from_json(MINIMAL).unwrap();
        let params = config.jenkins.build_params();
        assert_eq!(params.get("VERSION").map(String::as_str), Some("11.0"));
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let mut config = RelayConfig::from_json(MINIMAL).unwrap();
        config.jenkins.api_token = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jenkins.api_token"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = RelayConfig::from_json(MINIMAL).unwrap();
        config.polling.build_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_marker_path_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildrelay.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MINIMAL.as_bytes())
            .unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.marker_path(), dir.path().join(DEFAULT_MARKER_FILE));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RelayConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_example_config_parses() {
        let config = RelayConfig::from_json(&example_config()).unwrap();
        assert_eq!(config.jenkins.job_name, "integration/testscripts");
        assert_eq!(config.repository.dir, PathBuf::from("."));
        assert_eq!(config.repository.expected_identifiers, ["integration-testscripts"]);
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let raw = MINIMAL.trim_end().trim_end_matches('}').to_string()
            + r#",
            "webdriver": { "chromedriver_path": "/usr/bin/chromedriver", "headless": false },
            "repository": { "branch": "release" }
        }"#;
        let config = RelayConfig::from_json(&raw).unwrap();

        assert_eq!(
            config.webdriver.chromedriver_path,
            Some(PathBuf::from("/usr/bin/chromedriver"))
        );
        assert!(!config.webdriver.headless);
        assert_eq!(config.webdriver.url, "http://localhost:9515");
        assert_eq!(config.webdriver.window_size, (1920, 1080));
        assert_eq!(config.webdriver.element_timeout_secs, 30);
        assert_eq!(config.webdriver.busy_timeout_secs, 30);

        assert_eq!(config.repository.branch, "release");
        assert_eq!(config.repository.dir, PathBuf::from("."));
        assert_eq!(config.repository.remote, "origin");
        assert!(config.repository.expected_identifiers.is_empty());
    }
}
