//! CI build-job management: creation from templates, triggering, polling
//! and last-build summaries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::CiServerConfig;
use crate::contract::{BuildSummary, CiJobs, ConfigMutator, JobInfo, JobSpec, PollOutcome};
use crate::detect::ProjectType;
use crate::error::{Error, Result};
use crate::http::{Payload, Transport};
use crate::templates::{self, TemplateStore};

/// Job metadata as served by the CI server.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJob {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    in_queue: bool,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    last_build: Option<BuildRef>,
    #[serde(default)]
    last_completed_build: Option<BuildRef>,
    #[serde(default)]
    last_failed_build: Option<BuildRef>,
    #[serde(default)]
    last_stable_build: Option<BuildRef>,
}

/// Reference to one build inside job metadata.
#[derive(Debug, Clone, Deserialize)]
struct BuildRef {
    #[serde(default)]
    number: u32,
    #[serde(default)]
    url: Option<String>,
}

/// Build metadata as served by the CI server.
#[derive(Debug, Deserialize)]
struct RawBuild {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    number: u32,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    building: bool,
}

/// Manager for build jobs nested under CI accounts.
#[derive(Debug, Clone)]
pub struct CiJobManager {
    config: CiServerConfig,
    templates: TemplateStore,
    transport: Transport,
}

impl CiJobManager {
    pub fn new(config: CiServerConfig, templates: TemplateStore, transport: Transport) -> Self {
        Self {
            config,
            templates,
            transport,
        }
    }

    fn auth(&self) -> Option<(&str, &str)> {
        Some((&self.config.username, &self.config.token))
    }

    fn job_url(&self, username: &str, job_name: &str) -> String {
        format!("{}/job/{}/job/{}", self.config.url, username, job_name)
    }

    async fn fetch_raw_job(&self, username: &str, job_name: &str) -> Result<Option<RawJob>> {
        let url = format!("{}/api/json", self.job_url(username, job_name));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query job metadata"));
        }
        let raw = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("job metadata: {e}")))?;
        Ok(Some(raw))
    }

    /// Resolve one last-build slot into a summary via the build's own
    /// metadata document.
    async fn fetch_summary(&self, slot: Option<BuildRef>) -> Result<Option<BuildSummary>> {
        let Some(build) = slot else {
            return Ok(None);
        };
        let Some(build_url) = build.url else {
            // No address to resolve against; report what the slot carries.
            return Ok(Some(BuildSummary {
                result: "UNKNOWN".to_string(),
                number: build.number,
                url: None,
                timestamp: 0,
            }));
        };

        let url = format!("{}/api/json", build_url.trim_end_matches('/'));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if !response.is_success() {
            return Err(Error::remote(response.status, "query build metadata"));
        }
        let raw: RawBuild = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("build metadata: {e}")))?;

        Ok(Some(BuildSummary {
            result: raw.result.unwrap_or_else(|| "UNKNOWN".to_string()),
            number: raw.number,
            url: raw.url.or(Some(build_url)),
            timestamp: raw.timestamp,
        }))
    }

    /// Whether the job is queued or has a build in flight.
    async fn is_building(&self, username: &str, job_name: &str) -> Result<bool> {
        let Some(raw) = self.fetch_raw_job(username, job_name).await? else {
            return Ok(false);
        };

        if raw.in_queue || raw.color.as_deref().unwrap_or("").contains("anime") {
            return Ok(true);
        }

        // The color code can lag; the last build's own flag settles it.
        if let Some(BuildRef { url: Some(build_url), .. }) = raw.last_build {
            let url = format!("{}/api/json", build_url.trim_end_matches('/'));
            let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
            if response.is_success() {
                let build: RawBuild = serde_json::from_str(&response.body)
                    .map_err(|e| Error::Parse(format!("build metadata: {e}")))?;
                return Ok(build.building);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl CiJobs for CiJobManager {
    async fn create_job<'a>(
        &self,
        username: &'a str,
        spec: JobSpec<'a>,
        mutate: Option<ConfigMutator>,
    ) -> Result<()> {
        if self.query_job(username, spec.name).await?.is_some() {
            debug!(username, job = spec.name, "job already exists, skipping creation");
            return Ok(());
        }

        let template_id = match spec.project_type {
            ProjectType::Freestyle => templates::JOB_FREESTYLE,
            ProjectType::Maven => templates::JOB_MAVEN,
        };
        let mut document = self
            .templates
            .render(template_id, &[("{PROJECT_URL}", spec.repo_url)])?;
        if let Some(mutate) = mutate {
            document = mutate(document);
        }

        let url = format!(
            "{}/job/{}/createItem?name={}",
            self.config.url, username, spec.name
        );
        self.transport
            .expect_success(
                Method::POST,
                &url,
                self.auth(),
                Some(Payload::xml(document)),
                "create CI job",
            )
            .await?;
        info!(username, job = spec.name, project_type = ?spec.project_type, "created CI job");
        Ok(())
    }

    async fn trigger_build(&self, username: &str, job_name: &str) -> Result<()> {
        let url = format!("{}/build", self.job_url(username, job_name));
        self.transport
            .expect_success(Method::POST, &url, self.auth(), None, "trigger build")
            .await?;
        info!(username, job = job_name, "queued build");
        Ok(())
    }

    async fn poll_until_idle(
        &self,
        username: &str,
        job_name: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<PollOutcome> {
        let start = tokio::time::Instant::now();
        loop {
            if !self.is_building(username, job_name).await? {
                return Ok(PollOutcome::Idle);
            }
            if start.elapsed() >= timeout {
                debug!(username, job = job_name, "poll bound elapsed, job still busy");
                return Ok(PollOutcome::TimedOut);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn job_info(&self, username: &str, job_name: &str) -> Result<Option<JobInfo>> {
        let Some(raw) = self.fetch_raw_job(username, job_name).await? else {
            return Ok(None);
        };

        // The four slots are read-only lookups against distinct URLs.
        let (last_build, last_completed_build, last_failed_build, last_stable_build) = futures::try_join!(
            self.fetch_summary(raw.last_build),
            self.fetch_summary(raw.last_completed_build),
            self.fetch_summary(raw.last_failed_build),
            self.fetch_summary(raw.last_stable_build),
        )?;

        Ok(Some(JobInfo {
            name: raw.name,
            url: raw.url,
            description: raw.description,
            last_build,
            last_completed_build,
            last_failed_build,
            last_stable_build,
        }))
    }

    async fn delete_job(&self, username: &str, job_name: &str) -> Result<()> {
        let url = format!("{}/doDelete", self.job_url(username, job_name));
        let response = self.transport.send(Method::POST, &url, self.auth(), None).await?;
        if response.is_not_found() {
            debug!(username, job = job_name, "job already absent");
            return Ok(());
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "delete CI job"));
        }
        info!(username, job = job_name, "deleted CI job");
        Ok(())
    }

    async fn query_job(&self, username: &str, job_name: &str) -> Result<Option<String>> {
        let url = format!("{}/config.xml", self.job_url(username, job_name));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query CI job"));
        }
        Ok(Some(response.body))
    }
}
