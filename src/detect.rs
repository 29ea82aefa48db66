//! Build-system type detection for source repositories.
//!
//! A repository is probed for build-tool manifests on its default branch;
//! the first marker that resolves decides the classification. Detection is
//! deliberately fail-safe: any error along the way yields
//! [`ProjectType::Freestyle`] so a flaky third-party host cannot break the
//! provisioning workflow.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contract::ProjectClassifier;
use crate::http::Transport;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_RAW: &str = "https://raw.githubusercontent.com";

/// Classification of a source repository's build system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    /// No recognized build-tool manifest; built with the generic template.
    Freestyle,
    /// Maven build, deployed with `clean deploy`.
    Maven,
}

impl ProjectType {
    pub fn is_freestyle(self) -> bool {
        matches!(self, Self::Freestyle)
    }
}

/// Ordered marker list. The first path that resolves on the default branch
/// decides the type.
pub const BUILD_MARKERS: &[(&str, ProjectType)] = &[
    ("pom.xml", ProjectType::Maven),
    ("dependency-reduced-pom.xml", ProjectType::Maven),
];

#[derive(Debug, Deserialize)]
struct RepoMetadata {
    default_branch: String,
}

/// Detector probing a repository host over HTTP.
#[derive(Debug, Clone)]
pub struct ProjectDetector {
    transport: Transport,
    api_base: String,
    raw_base: String,
}

impl ProjectDetector {
    pub fn new(transport: Transport) -> Self {
        Self::with_hosts(transport, GITHUB_API, GITHUB_RAW)
    }

    /// Use alternate API and raw-content hosts. Intended for tests.
    pub fn with_hosts(
        transport: Transport,
        api_base: impl Into<String>,
        raw_base: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            raw_base: raw_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Option<String> {
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let response = match self.transport.send(Method::GET, &url, None, None).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(status = response.status, owner, repo, "repository lookup failed");
                return None;
            }
            Err(error) => {
                warn!(?error, owner, repo, "repository lookup failed");
                return None;
            }
        };

        match serde_json::from_str::<RepoMetadata>(&response.body) {
            Ok(metadata) => Some(metadata.default_branch),
            Err(error) => {
                warn!(?error, owner, repo, "unparseable repository metadata");
                None
            }
        }
    }
}

#[async_trait]
impl ProjectClassifier for ProjectDetector {
    async fn classify(&self, repo_url: &str) -> ProjectType {
        let Some((owner, repo)) = parse_owner_repo(repo_url) else {
            warn!(repo_url, "unrecognized repository URL, defaulting to freestyle");
            return ProjectType::Freestyle;
        };

        let Some(branch) = self.default_branch(&owner, &repo).await else {
            return ProjectType::Freestyle;
        };

        for (marker, project_type) in BUILD_MARKERS {
            let url = format!(
                "{}/{}/{}/{}/{}",
                self.raw_base, owner, repo, branch, marker
            );
            match self.transport.send(Method::GET, &url, None, None).await {
                Ok(response) if response.is_success() => {
                    debug!(owner, repo, marker, "marker file found");
                    return *project_type;
                }
                Ok(response) if response.is_not_found() => continue,
                Ok(response) => {
                    // Anything but "found" or "absent" ends the scan.
                    warn!(
                        status = response.status,
                        owner, repo, marker, "marker probe failed, defaulting to freestyle"
                    );
                    return ProjectType::Freestyle;
                }
                Err(error) => {
                    warn!(?error, owner, repo, marker, "marker probe failed, defaulting to freestyle");
                    return ProjectType::Freestyle;
                }
            }
        }

        ProjectType::Freestyle
    }
}

/// Extracts `(owner, repo)` from a Git hosting URL such as
/// `https://github.com/owner/repo` or `https://github.com/owner/repo.git`.
fn parse_owner_repo(repo_url: &str) -> Option<(String, String)> {
    let trimmed = repo_url
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let rest = trimmed.split_once("://").map_or(trimmed, |(_, rest)| rest);

    let mut segments = rest.split('/');
    let _host = segments.next()?;
    let owner = segments.next()?;
    let repo = segments.next()?;
    if owner.is_empty() || repo.is_empty() || segments.next().is_some() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
