//! Provisioning orchestrator: composes the account, job and repository
//! managers into the two public lifecycle operations.
//!
//! `onboard` is a strictly ordered sequence that halts at the first
//! failing step and names it; there is no automatic rollback of earlier
//! steps. `offboard` is the opposite: best-effort deletion of everything,
//! continuing past failures and reporting each outcome.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use crate::contract::{CiAccounts, CiJobs, JobSpec, ProjectClassifier, RepoAccounts};
use crate::detect::ProjectType;
use crate::error::Error as ProvisionError;
use crate::generator::create_password;

/// Length of generated account passwords.
const PASSWORD_LENGTH: usize = 24;

/// Input for one onboarding run.
#[derive(Debug, Clone)]
pub struct OnboardRequest<'a> {
    /// Display name of the person; also the CI account name. The
    /// repository-side id is its lowercase form.
    pub name: &'a str,
    /// Git URL of the source repository to build.
    pub repo_url: &'a str,
    /// Name of the build job to create under the account.
    pub job_name: &'a str,
}

/// The steps of the onboarding sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardStep {
    CiAccount,
    RepositoryAccount,
    CredentialBinding,
    BuildConfig,
    CiJob,
}

impl fmt::Display for OnboardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CiAccount => "CI account creation",
            Self::RepositoryAccount => "repository account provisioning",
            Self::CredentialBinding => "credential binding",
            Self::BuildConfig => "build configuration patching",
            Self::CiJob => "CI job creation",
        };
        f.write_str(name)
    }
}

/// An onboarding failure, carrying the identity of the failed step so a
/// retry can be informed rather than blind.
#[derive(Debug, Error)]
#[error("onboarding halted at {step}: {source}")]
pub struct OnboardError {
    pub step: OnboardStep,
    #[source]
    pub source: ProvisionError,
}

/// What a successful onboarding produced.
#[derive(Debug, Clone)]
pub struct OnboardReport {
    /// CI account name.
    pub username: String,
    /// Generated password shared by the CI credential and the repository
    /// user. The caller is responsible for conveying it to the person.
    pub password: String,
    /// Derived name of the hosted repository.
    pub repository: String,
    /// Detected build-system type of the source repository.
    pub project_type: ProjectType,
}

/// Outcome of one offboarding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn from_result(result: Result<(), ProvisionError>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Per-step outcomes of an offboarding run.
#[derive(Debug, Clone)]
pub struct OffboardReport {
    pub job: StepOutcome,
    pub account: StepOutcome,
    pub repository: StepOutcome,
}

impl OffboardReport {
    /// Whether every deletion succeeded.
    pub fn is_success(&self) -> bool {
        self.job.is_success() && self.account.is_success() && self.repository.is_success()
    }
}

fn step<T>(
    result: Result<T, ProvisionError>,
    step: OnboardStep,
) -> Result<T, OnboardError> {
    result.map_err(|source| {
        error!(%step, error = %source, "onboarding step failed");
        OnboardError { step, source }
    })
}

/// Provision the full set of remote objects for one person: CI account,
/// repository account, credential binding, build configuration and build
/// job, all sharing one generated password.
pub async fn onboard<C, J, R, P>(
    accounts: &C,
    jobs: &J,
    repos: &R,
    classifier: &P,
    request: OnboardRequest<'_>,
) -> Result<OnboardReport, OnboardError>
where
    C: CiAccounts + ?Sized,
    J: CiJobs + ?Sized,
    R: RepoAccounts + ?Sized,
    P: ProjectClassifier + ?Sized,
{
    let OnboardRequest {
        name,
        repo_url,
        job_name,
    } = request;
    let repository = name.to_lowercase();
    let password = create_password(PASSWORD_LENGTH);

    info!(name, repo_url, job = job_name, "starting onboarding");

    let project_type = classifier.classify(repo_url).await;
    info!(name, ?project_type, "classified source repository");

    step(accounts.create_account(name, &password).await, OnboardStep::CiAccount)?;
    step(repos.provision(name, &password).await, OnboardStep::RepositoryAccount)?;
    step(
        accounts.bind_credential(name, &password).await,
        OnboardStep::CredentialBinding,
    )?;
    step(accounts.patch_build_config(name).await, OnboardStep::BuildConfig)?;

    // Wire the job's deployment target to the hosted repository that the
    // provisioning step just ensured exists.
    let deploy_url = repos.repository_url(name);
    let mutate = deployment_mutator(project_type, &repository, &deploy_url);
    let spec = JobSpec {
        name: job_name,
        repo_url,
        project_type,
    };
    step(
        jobs.create_job(name, spec, Some(mutate)).await,
        OnboardStep::CiJob,
    )?;

    info!(name, repository = %repository, "onboarding complete");
    Ok(OnboardReport {
        username: name.to_string(),
        password,
        repository,
        project_type,
    })
}

/// Retire the remote objects for one person. Each deletion is attempted
/// regardless of the others' outcomes.
pub async fn offboard<C, J, R>(
    accounts: &C,
    jobs: &J,
    repos: &R,
    name: &str,
    job_name: &str,
) -> OffboardReport
where
    C: CiAccounts + ?Sized,
    J: CiJobs + ?Sized,
    R: RepoAccounts + ?Sized,
{
    info!(name, job = job_name, "starting offboarding");

    let job = StepOutcome::from_result(jobs.delete_job(name, job_name).await);
    if let StepOutcome::Failed(reason) = &job {
        error!(name, job = job_name, reason = %reason, "job deletion failed, continuing");
    }

    let account = StepOutcome::from_result(accounts.delete_account(name).await);
    if let StepOutcome::Failed(reason) = &account {
        error!(name, reason = %reason, "account deletion failed, continuing");
    }

    let repository = StepOutcome::from_result(repos.deprovision(name).await);
    if let StepOutcome::Failed(reason) = &repository {
        error!(name, reason = %reason, "repository deprovisioning failed");
    }

    let report = OffboardReport {
        job,
        account,
        repository,
    };
    info!(name, success = report.is_success(), "offboarding finished");
    report
}

/// Build the job-document mutation that points deployment at the hosted
/// repository.
fn deployment_mutator(
    project_type: ProjectType,
    repository: &str,
    deploy_url: &str,
) -> crate::contract::ConfigMutator {
    match project_type {
        ProjectType::Freestyle => {
            let replacement = format!("<tasks>publish -PrepositoryURL={deploy_url}</tasks>");
            Box::new(move |document: String| {
                document.replace("<tasks>publish</tasks>", &replacement)
            })
        }
        ProjectType::Maven => {
            let replacement = format!(
                "<goals>clean deploy -DaltDeploymentRepository={repository}::{deploy_url}</goals>"
            );
            Box::new(move |document: String| {
                document.replace("<goals>clean deploy</goals>", &replacement)
            })
        }
    }
}
