use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid repository name: {0:?} (expected owner/name)")]
pub struct InvalidRepoName(pub String);

/// A GitHub repository identity, written `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoName {
    type Err = InvalidRepoName;

    /// Accepts `owner/name`, or a `https://github.com/owner/name` url.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRepoName(s.to_string());
        let trimmed = s.trim();
        let path = match reqwest::Url::parse(trimmed) {
            Ok(url) => {
                if url.host_str() != Some("github.com") {
                    return Err(invalid());
                }
                url.path().trim_matches('/').trim_end_matches(".git").to_string()
            }
            Err(_) => trimmed.to_string(),
        };

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 2 {
            return Err(invalid());
        }
        let valid = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(segments[0]) || !valid(segments[1]) {
            return Err(invalid());
        }

        Ok(RepoName {
            owner: segments[0].to_string(),
            name: segments[1].to_string(),
        })
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
