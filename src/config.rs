use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::session::DEFAULT_BRANCH_PREFIX;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PR_TITLE: &str = "Code Swipe review changes";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .code-swipe.toml.
/// Every field is optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Base url of the REST API, for GitHub Enterprise installs.
    pub api_url: Option<String>,
}

impl GitHubConfig {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionConfig {
    /// Upper bound on one pull request submission, in seconds.
    pub timeout_secs: Option<u64>,
    /// Prefix of the review branch; the session id is appended.
    pub branch_prefix: Option<String>,
    /// Title of the pull request and of its commit.
    pub title: Option<String>,
}

impl SubmissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn branch_prefix(&self) -> &str {
        self.branch_prefix.as_deref().unwrap_or(DEFAULT_BRANCH_PREFIX)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_PR_TITLE)
    }
}

impl Config {
    /// Load configuration from .code-swipe.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".code-swipe.toml");
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url(), DEFAULT_API_URL);
        assert_eq!(config.submission.timeout(), Duration::from_secs(30));
        assert_eq!(config.submission.branch_prefix(), "code-swipe/session-");
        assert_eq!(config.submission.title(), DEFAULT_PR_TITLE);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
api_url = "https://ghe.example.com/api/v3"

[submission]
timeout_secs = 5
branch_prefix = "review/"
title = "Tidy helpers"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.api_url(), "https://ghe.example.com/api/v3");
        assert_eq!(config.submission.timeout(), Duration::from_secs(5));
        assert_eq!(config.submission.branch_prefix(), "review/");
        assert_eq!(config.submission.title(), "Tidy helpers");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("code_swipe_test_config.toml");
        std::fs::write(&path, "[submission]\ntimeout_secs = 12\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.submission.timeout_secs, Some(12));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_rejects_bad_toml() {
        let path = std::env::temp_dir().join("code_swipe_bad_config.toml");
        std::fs::write(&path, "[submission\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }
}
