//! CI server account and credential management.
//!
//! Accounts live as one folder per user on the CI server; the folder's
//! `config.xml` doubles as the existence probe. Each account carries a
//! credential domain and a single repository-login credential entry that
//! build jobs use to deploy without seeing the secret.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info};

use crate::config::CiServerConfig;
use crate::contract::CiAccounts;
use crate::error::{Error, Result};
use crate::http::{Payload, Transport};
use crate::templates::{self, TemplateStore};

/// Credential id of the repository-manager login.
pub const REPO_CREDENTIALS_ID: &str = "nexus-repository";

/// Description attached to the repository-login credential.
pub const REPO_CREDENTIALS_DESCRIPTION: &str = "Your Nexus Login Details";

/// Name of the credential domain scoping the entry.
pub const CREDENTIAL_DOMAIN: &str = "Services";

/// Marker proving the settings fragment is already merged into an
/// account's build configuration.
const SETTINGS_MARKER: &str = "<id>nexus-login</id>";

/// Manager for per-user CI accounts.
#[derive(Debug, Clone)]
pub struct CiAccountManager {
    config: CiServerConfig,
    templates: TemplateStore,
    transport: Transport,
}

impl CiAccountManager {
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

    fn account_url(&self, username: &str) -> String {
        format!("{}/job/{}", self.config.url, username)
    }

    fn credential_store_url(&self, username: &str) -> String {
        format!("{}/credentials/store/folder", self.account_url(username))
    }

    /// Check that the CI server is reachable and answering.
    pub async fn ping(&self) -> Result<bool> {
        let url = format!("{}/api/json", self.config.url);
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        Ok(response.is_success())
    }
}

#[async_trait]
impl CiAccounts for CiAccountManager {
    async fn create_account(&self, username: &str, password: &str) -> Result<()> {
        if self.query_account(username).await?.is_some() {
            debug!(username, "account already exists, skipping creation");
            return Ok(());
        }

        let document = self
            .templates
            .render(templates::USER_CONFIG, &[("{USERNAME}", username)])?;
        let url = format!("{}/createItem?name={}", self.config.url, username);
        self.transport
            .expect_success(
                Method::POST,
                &url,
                self.auth(),
                Some(Payload::xml(document)),
                "create CI account",
            )
            .await?;
        info!(username, "created CI account");

        self.bind_credential(username, password).await
    }

    async fn bind_credential(&self, username: &str, repo_password: &str) -> Result<()> {
        // The credential domain has to exist before entries can be added.
        let domain_url = format!(
            "{}/domain/{}/config.xml",
            self.credential_store_url(username),
            CREDENTIAL_DOMAIN
        );
        let domain = self
            .transport
            .send(Method::GET, &domain_url, self.auth(), None)
            .await?;
        if domain.is_not_found() {
            let document = self.templates.get(templates::CREDENTIALS_DOMAIN)?;
            let create_url = format!("{}/createDomain", self.credential_store_url(username));
            self.transport
                .expect_success(
                    Method::POST,
                    &create_url,
                    self.auth(),
                    Some(Payload::xml(document)),
                    "create credential domain",
                )
                .await?;
            debug!(username, "created credential domain");
        }

        let entry = self.templates.render(
            templates::CREDENTIALS,
            &[
                ("{ID}", REPO_CREDENTIALS_ID),
                ("{DESCRIPTION}", REPO_CREDENTIALS_DESCRIPTION),
                ("{USERNAME}", &username.to_lowercase()),
                ("{PASSWORD}", repo_password),
            ],
        )?;

        let create_url = format!(
            "{}/domain/{}/createCredentials",
            self.credential_store_url(username),
            CREDENTIAL_DOMAIN
        );
        let created = self
            .transport
            .send(
                Method::POST,
                &create_url,
                self.auth(),
                Some(Payload::xml(entry.clone())),
            )
            .await?;

        // A conflict means the entry exists: overwrite it in place.
        if created.status == 409 {
            let update_url = format!(
                "{}/domain/{}/credential/{}/config.xml",
                self.credential_store_url(username),
                CREDENTIAL_DOMAIN,
                REPO_CREDENTIALS_ID
            );
            self.transport
                .expect_success(
                    Method::POST,
                    &update_url,
                    self.auth(),
                    Some(Payload::xml(entry)),
                    "update credential entry",
                )
                .await?;
            info!(username, "updated existing repository credential");
            return Ok(());
        }

        if !created.is_success() {
            return Err(Error::remote(created.status, "create credential entry"));
        }
        info!(username, "bound repository credential");
        Ok(())
    }

    async fn patch_build_config(&self, username: &str) -> Result<()> {
        let Some(document) = self.query_account(username).await? else {
            return Err(Error::remote(404, "fetch build configuration for patching"));
        };

        if document.contains(SETTINGS_MARKER) {
            debug!(username, "build configuration already wired, skipping patch");
            return Ok(());
        }

        let fragment = self.templates.get(templates::MAVEN_SETTINGS)?;
        let Some(insert_at) = document.find("</configs>") else {
            return Err(Error::MalformedDocument(format!(
                "account configuration for {username} has no configs section"
            )));
        };

        let mut patched = String::with_capacity(document.len() + fragment.len() + 1);
        patched.push_str(&document[..insert_at]);
        patched.push_str(fragment);
        patched.push('\n');
        patched.push_str(&document[insert_at..]);

        let url = format!("{}/config.xml", self.account_url(username));
        self.transport
            .expect_success(
                Method::POST,
                &url,
                self.auth(),
                Some(Payload::xml(patched)),
                "write patched build configuration",
            )
            .await?;
        info!(username, "merged build settings into account configuration");
        Ok(())
    }

    async fn delete_account(&self, username: &str) -> Result<()> {
        let url = format!("{}/doDelete", self.account_url(username));
        let response = self.transport.send(Method::POST, &url, self.auth(), None).await?;
        if response.is_not_found() {
            debug!(username, "account already absent");
            return Ok(());
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "delete CI account"));
        }
        info!(username, "deleted CI account");
        Ok(())
    }

    async fn query_account(&self, username: &str) -> Result<Option<String>> {
        let url = format!("{}/config.xml", self.account_url(username));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query CI account"));
        }
        Ok(Some(response.body))
    }
}
