use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{apply_changes, pull_request_body, ChangeSet, PullRequestSubmitter, SubmitError};
use crate::config::Config;

const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw";

/// Opens pull requests through the GitHub REST API.
///
/// The whole change set goes into a single commit on a new branch cut from
/// the repository's default branch:
/// 1. GET the repository for its default branch
/// 2. GET the branch ref and its commit for the base tree
/// 3. GET each touched file raw at the base commit and apply the card ranges
/// 4. POST a tree with the changed files, then a commit on top of the base
/// 5. POST the branch ref, then the pull request
pub struct GitHubSubmitter {
    client: reqwest::Client,
    api_url: String,
    token: String,
    title: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: GitObject,
}

#[derive(Deserialize)]
struct PullResponse {
    html_url: String,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: String,
}

/// Url of a file in the contents API. Each path segment is percent-encoded,
/// so `#` and `?` in file names stay part of the path.
fn contents_url(repo_url: &str, path: &str) -> Result<Url, SubmitError> {
    let mut url = Url::parse(repo_url).map_err(|e| SubmitError::InvalidUrl(format!("{repo_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| SubmitError::InvalidUrl(repo_url.to_string()))?
        .push("contents")
        .extend(path.split('/'));
    Ok(url)
}

impl GitHubSubmitter {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            title: title.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SubmitError> {
        let token = config.github_token().ok_or(SubmitError::MissingToken)?;
        Ok(Self::new(config.github.api_url(), token, config.submission.title()))
    }

    fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", "code-swipe")
            .header("Accept", accept)
            .bearer_auth(&self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SubmitError> {
        let response = self
            .request(Method::GET, url, JSON_ACCEPT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, SubmitError> {
        let response = self
            .request(Method::POST, url, JSON_ACCEPT)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PullRequestSubmitter for GitHubSubmitter {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(skip(self, changes), fields(repo = %changes.repo, branch = %changes.branch_name))]
    async fn submit(&self, changes: &ChangeSet) -> Result<String, SubmitError> {
        let repo_url = format!("{}/repos/{}/{}", self.api_url, changes.repo.owner, changes.repo.name);

        let repo: RepoResponse = self.get_json(&repo_url).await?;
        let base: RefResponse = self
            .get_json(&format!("{}/git/ref/heads/{}", repo_url, repo.default_branch))
            .await?;
        let base_sha = base.object.sha;
        let base_commit: CommitResponse = self
            .get_json(&format!("{}/git/commits/{}", repo_url, base_sha))
            .await?;
        debug!(base = %repo.default_branch, sha = %base_sha, "resolved base commit");

        let mut tree = Vec::new();
        for (path, file_changes) in changes.by_file() {
            let url = contents_url(&repo_url, path)?;
            let original = self
                .request(Method::GET, url.as_str(), RAW_ACCEPT)
                .query(&[("ref", base_sha.as_str())])
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            let updated = apply_changes(path, &original, &file_changes)?;
            if updated == original {
                debug!(path, "file unchanged, left out of tree");
                continue;
            }
            debug!(path, cards = file_changes.len(), bytes = updated.len(), "file updated");
            tree.push(TreeEntry {
                path,
                mode: "100644",
                kind: "blob",
                content: updated,
            });
        }
        if tree.is_empty() {
            return Err(SubmitError::NothingChanged);
        }

        let new_tree: GitObject = self
            .post_json(
                &format!("{}/git/trees", repo_url),
                &serde_json::json!({ "base_tree": base_commit.tree.sha, "tree": tree }),
            )
            .await?;
        let commit: GitObject = self
            .post_json(
                &format!("{}/git/commits", repo_url),
                &serde_json::json!({
                    "message": self.title,
                    "tree": new_tree.sha,
                    "parents": [base_sha],
                }),
            )
            .await?;
        let _branch: serde_json::Value = self
            .post_json(
                &format!("{}/git/refs", repo_url),
                &serde_json::json!({
                    "ref": format!("refs/heads/{}", changes.branch_name),
                    "sha": commit.sha,
                }),
            )
            .await?;
        debug!(commit = %commit.sha, files = tree.len(), "pushed review branch");

        let pull: PullResponse = self
            .post_json(
                &format!("{}/pulls", repo_url),
                &serde_json::json!({
                    "title": self.title,
                    "head": changes.branch_name,
                    "base": repo.default_branch,
                    "body": pull_request_body(changes),
                }),
            )
            .await?;
        info!(pr_url = %pull.html_url, "opened pull request");
        Ok(pull.html_url)
    }
}
