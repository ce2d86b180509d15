use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::card::CardDraft;
use crate::submit::RepoName;

const SAMPLE_CARDS: &str = include_str!("../../tests/fixtures/sample_cards.json");

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read card manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse card manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid card {file_path}:{start_line}-{end_line}: {reason}")]
    InvalidCard {
        file_path: String,
        start_line: usize,
        end_line: usize,
        reason: &'static str,
    },
}

/// Populates a new session with cards. Extraction itself happens elsewhere;
/// a source only hands over the snippets for a repository.
#[async_trait]
pub trait CardSource: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, repo: &RepoName) -> Result<Vec<CardDraft>, SourceError>;
}

/// Built-in sample cards, for demos and tests.
#[derive(Debug, Default)]
pub struct FixtureSource;

#[async_trait]
impl CardSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn extract(&self, repo: &RepoName) -> Result<Vec<CardDraft>, SourceError> {
        let drafts = parse_manifest(SAMPLE_CARDS)?;
        info!(%repo, cards = drafts.len(), "loaded sample cards");
        Ok(drafts)
    }
}

/// Cards exported by an extractor as a JSON array of
/// `{file_path, start_line, end_line, ast_signature, original_content}`.
#[derive(Debug)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CardSource for ManifestSource {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn extract(&self, repo: &RepoName) -> Result<Vec<CardDraft>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
        let drafts = parse_manifest(&raw)?;
        info!(%repo, path = %self.path.display(), cards = drafts.len(), "loaded card manifest");
        Ok(drafts)
    }
}

/// Parse and validate a manifest. Repeated snippets (same file, signature
/// and content) are kept once.
pub fn parse_manifest(raw: &str) -> Result<Vec<CardDraft>, SourceError> {
    let drafts: Vec<CardDraft> = serde_json::from_str(raw)?;
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(drafts.len());
    for draft in drafts {
        validate(&draft)?;
        let key = (
            draft.file_path.clone(),
            draft.ast_signature.clone(),
            draft.original_content.clone(),
        );
        if !seen.insert(key) {
            debug!(file = %draft.file_path, signature = %draft.ast_signature, "duplicate card dropped");
            continue;
        }
        unique.push(draft);
    }
    Ok(unique)
}

fn validate(draft: &CardDraft) -> Result<(), SourceError> {
    let reason = if draft.file_path.trim().is_empty() {
        Some("empty file path")
    } else if draft.start_line == 0 {
        Some("lines are 1-based")
    } else if draft.end_line < draft.start_line {
        Some("end line before start line")
    } else if draft.original_content.trim().is_empty() {
        Some("empty content")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SourceError::InvalidCard {
            file_path: draft.file_path.clone(),
            start_line: draft.start_line,
            end_line: draft.end_line,
            reason,
        }),
        None => Ok(()),
    }
}
