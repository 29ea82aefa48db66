//! Trait seams between the orchestrator and the remote-service managers.
//!
//! The orchestrator only knows these traits; the concrete managers in
//! [`crate::ci_account`], [`crate::ci_job`] and [`crate::repo_account`]
//! implement them against the real services. The traits are annotated for
//! `mockall`, so consumers can drive the workflow with deterministic mocks
//! in tests (exported via the `test-export-mocks` feature).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::detect::ProjectType;
use crate::error::Result;

/// Mutation applied to a rendered job document before submission. Used to
/// inject caller-derived parameters, such as the deployment repository URL.
pub type ConfigMutator = Box<dyn Fn(String) -> String + Send + Sync>;

/// The data needed to create a CI build job.
#[derive(Debug, Clone)]
pub struct JobSpec<'a> {
    /// Job name, unique within the owning account.
    pub name: &'a str,
    /// Git URL of the source repository.
    pub repo_url: &'a str,
    /// Detected build-system type, selects the job template.
    pub project_type: ProjectType,
}

/// Outcome of waiting for a job to leave the queued/building state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job is neither queued nor building.
    Idle,
    /// The bound elapsed while the job was still queued or building.
    TimedOut,
}

/// Point-in-time snapshot of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Result string reported by the CI server (`SUCCESS`, `FAILURE`,
    /// `ABORTED`, ...); `UNKNOWN` when the build reported none.
    pub result: String,
    /// Build number; 0 means no identifiable build.
    pub number: u32,
    /// URL of the build, when known.
    pub url: Option<String>,
    /// Epoch timestamp of the build; 0 means unknown.
    pub timestamp: u64,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match (&self.url, self.number) {
            (Some(url), number) if number != 0 => format!("[Build #{number}]({url})"),
            (Some(url), _) => format!("[Unknown Build]({url})"),
            (None, number) if number != 0 => format!("Build #{number}"),
            (None, _) => "Unknown Build".to_string(),
        };
        let when = if self.timestamp == 0 {
            "Sometime".to_string()
        } else {
            format!("<t:{}:f>", self.timestamp)
        };
        writeln!(f, "{}", self.result)?;
        writeln!(f, "{title} - {when}")
    }
}

/// Job metadata with the four last-build summary slots resolved.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub last_build: Option<BuildSummary>,
    pub last_completed_build: Option<BuildSummary>,
    pub last_failed_build: Option<BuildSummary>,
    pub last_stable_build: Option<BuildSummary>,
}

/// Account and credential operations on the CI server.
///
/// All operations are idempotent under retry: creation on an existing
/// resource is a no-op success, credential conflicts convert to updates,
/// and deleting an absent resource succeeds.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CiAccounts: Send + Sync {
    /// Create the account and bind its repository credential. No-op when
    /// the account already exists.
    async fn create_account(&self, username: &str, password: &str) -> Result<()>;

    /// Ensure the credential domain exists, then create or overwrite the
    /// repository-login credential entry (last-write-wins).
    async fn bind_credential(&self, username: &str, repo_password: &str) -> Result<()>;

    /// Merge the build-settings fragment into the account's configuration
    /// document unless it is already wired in.
    async fn patch_build_config(&self, username: &str) -> Result<()>;

    /// Delete the account. An already-absent account is a success.
    async fn delete_account(&self, username: &str) -> Result<()>;

    /// Fetch the account's configuration document, or `None` if the
    /// account does not exist.
    async fn query_account(&self, username: &str) -> Result<Option<String>>;
}

/// Build-job operations on the CI server.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CiJobs: Send + Sync {
    /// Create a job from the template selected by the spec's project type.
    /// No-op when the job already exists.
    async fn create_job<'a>(
        &self,
        username: &'a str,
        spec: JobSpec<'a>,
        mutate: Option<ConfigMutator>,
    ) -> Result<()>;

    /// Queue a build. Success means queued, not completed.
    async fn trigger_build(&self, username: &str, job_name: &str) -> Result<()>;

    /// Wait until the job is neither queued nor building, probing every
    /// `interval`, for at most `timeout` of wall-clock time.
    async fn poll_until_idle(
        &self,
        username: &str,
        job_name: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<PollOutcome>;

    /// Fetch job metadata with all last-build summaries resolved, or
    /// `None` if the job does not exist.
    async fn job_info(&self, username: &str, job_name: &str) -> Result<Option<JobInfo>>;

    /// Delete the job. An already-absent job is a success.
    async fn delete_job(&self, username: &str, job_name: &str) -> Result<()>;

    /// Fetch the job's configuration document, or `None` if the job does
    /// not exist.
    async fn query_job(&self, username: &str, job_name: &str) -> Result<Option<String>>;
}

/// Repository, role and user operations on the artifact-repository manager.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepoAccounts: Send + Sync {
    /// Create the hosted repository, access role and bound user for
    /// `name`, skipping the pieces that already exist.
    async fn provision(&self, name: &str, password: &str) -> Result<()>;

    /// Delete repository, role and user, in that order, stopping at the
    /// first hard failure. Absent resources do not stop the sequence.
    async fn deprovision(&self, name: &str) -> Result<()>;

    /// Update the user's password; degrades to a full [`provision`]
    /// when the user does not exist.
    ///
    /// [`provision`]: RepoAccounts::provision
    async fn change_password(&self, name: &str, new_password: &str) -> Result<()>;

    /// Fetch the hosted repository resource, or `None` when absent.
    async fn query_repository(&self, name: &str) -> Result<Option<serde_json::Value>>;

    /// Fetch the user resource, or `None` when absent.
    async fn query_user(&self, name: &str) -> Result<Option<serde_json::Value>>;

    /// Public URL of the hosted repository derived from `name`, for use
    /// in deployment configuration.
    fn repository_url(&self, name: &str) -> String;
}

/// Classifies a source repository's build system.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ProjectClassifier: Send + Sync {
    /// Classify the repository at `repo_url`. Detection failures resolve
    /// conservatively to [`ProjectType::Freestyle`].
    async fn classify(&self, repo_url: &str) -> ProjectType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_with_number_url_and_no_timestamp() {
        let summary = BuildSummary {
            result: "SUCCESS".to_string(),
            number: 1,
            url: Some("http://x/1".to_string()),
            timestamp: 0,
        };
        assert_eq!(summary.to_string(), "SUCCESS\n[Build #1](http://x/1) - Sometime\n");
    }

    #[test]
    fn summary_with_url_but_no_number() {
        let summary = BuildSummary {
            result: "FAILURE".to_string(),
            number: 0,
            url: Some("http://x/1".to_string()),
            timestamp: 0,
        };
        assert_eq!(
            summary.to_string(),
            "FAILURE\n[Unknown Build](http://x/1) - Sometime\n"
        );
    }

    #[test]
    fn summary_without_url_or_number() {
        let summary = BuildSummary {
            result: "UNKNOWN".to_string(),
            number: 0,
            url: None,
            timestamp: 0,
        };
        assert_eq!(summary.to_string(), "UNKNOWN\nUnknown Build - Sometime\n");
    }

    #[test]
    fn summary_with_number_but_no_url() {
        let summary = BuildSummary {
            result: "ABORTED".to_string(),
            number: 7,
            url: None,
            timestamp: 0,
        };
        assert_eq!(summary.to_string(), "ABORTED\nBuild #7 - Sometime\n");
    }

    #[test]
    fn summary_with_timestamp_renders_the_token() {
        let summary = BuildSummary {
            result: "SUCCESS".to_string(),
            number: 3,
            url: Some("http://x/3".to_string()),
            timestamp: 1717171717,
        };
        assert_eq!(
            summary.to_string(),
            "SUCCESS\n[Build #3](http://x/3) - <t:1717171717:f>\n"
        );
    }
}
