#![doc = "ci-onboard: paired-identity provisioning across a CI server and an artifact-repository manager."]

//! One logical "onboard this person with this source repository" call
//! creates a consistent, idempotent set of remote objects: a CI account,
//! a build job wired to the right template, a repository-manager account,
//! an access role and a hosted repository, plus the credential binding
//! that lets build jobs deploy into the repository without re-entered
//! secrets. Offboarding retires the same set best-effort.
//!
//! # Usage
//! Construct the managers with their configurations, then drive
//! [`onboard::onboard`] / [`onboard::offboard`]. All managers are also
//! usable individually, and every seam is a mockable trait in
//! [`contract`].

pub mod ci_account;
pub mod ci_job;
pub mod config;
pub mod contract;
pub mod detect;
pub mod error;
pub mod generator;
pub mod http;
pub mod onboard;
pub mod repo_account;
pub mod templates;
