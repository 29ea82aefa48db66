//! Artifact-repository manager accounts.
//!
//! One onboarded person maps to three remote resources sharing a derived
//! lowercase id: a hosted repository, an access role scoped to it, and a
//! user bound to that role. The three are provisioned as a unit but probed
//! individually, so a partially-created set is completed rather than
//! treated as an error.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::RepoManagerConfig;
use crate::contract::RepoAccounts;
use crate::error::{Error, Result};
use crate::http::{Payload, Transport};

/// Privileges granted to an onboarded user's role, scoped to the hosted
/// repository with the given derived name.
fn role_privileges(name: &str) -> Vec<String> {
    vec![
        "nx-healthcheck-read".to_string(),
        "nx-search-read".to_string(),
        "nx-repository-view-*-*-read".to_string(),
        "nx-repository-view-*-*-browse".to_string(),
        format!("nx-repository-view-maven2-{name}-add"),
        format!("nx-repository-view-maven2-{name}-edit"),
    ]
}

/// Manager for hosted repositories, roles and users.
#[derive(Debug, Clone)]
pub struct RepoAccountManager {
    config: RepoManagerConfig,
    transport: Transport,
}

impl RepoAccountManager {
    pub fn new(config: RepoManagerConfig, transport: Transport) -> Self {
        Self { config, transport }
    }

    fn auth(&self) -> Option<(&str, &str)> {
        Some((&self.config.username, &self.config.password))
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url(), path)
    }

    /// Check that the repository manager is reachable and answering.
    pub async fn ping(&self) -> Result<bool> {
        let url = self.api("/status");
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        Ok(response.is_success())
    }

    async fn query_role(&self, id: &str) -> Result<Option<Value>> {
        let url = self.api(&format!("/security/roles/{id}"));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query access role"));
        }
        let value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("role resource: {e}")))?;
        Ok(Some(value))
    }

    /// Remove a resource, treating 204 and "already absent" as done.
    async fn delete_resource(&self, path: &str, context: &str) -> Result<()> {
        let url = self.api(path);
        let response = self.transport.send(Method::DELETE, &url, self.auth(), None).await?;
        match response.status {
            204 | 404 => Ok(()),
            status => Err(Error::remote(status, context)),
        }
    }
}

#[async_trait]
impl RepoAccounts for RepoAccountManager {
    async fn provision(&self, name: &str, password: &str) -> Result<()> {
        let id = name.to_lowercase();

        if self.query_repository(&id).await?.is_none() {
            let repository = json!({
                "name": id,
                "online": true,
                "storage": {
                    "blobStoreName": "default",
                    "strictContentTypeValidation": true,
                    "writePolicy": "allow"
                },
                "maven": {
                    "versionPolicy": "MIXED",
                    "layoutPolicy": "STRICT"
                }
            });
            self.transport
                .expect_success(
                    Method::POST,
                    &self.api("/repositories/maven/hosted"),
                    self.auth(),
                    Some(Payload::json(repository.to_string())),
                    "create hosted repository",
                )
                .await?;
            info!(name, repository = %id, "created hosted repository");
        } else {
            debug!(repository = %id, "hosted repository already exists");
        }

        if self.query_role(&id).await?.is_none() {
            let role = json!({
                "id": id,
                "name": name,
                "description": format!("Role for {name}"),
                "privileges": role_privileges(&id),
            });
            self.transport
                .expect_success(
                    Method::POST,
                    &self.api("/security/roles"),
                    self.auth(),
                    Some(Payload::json(role.to_string())),
                    "create access role",
                )
                .await?;
            info!(name, role = %id, "created access role");
        } else {
            debug!(role = %id, "access role already exists");
        }

        if self.query_user(&id).await?.is_none() {
            let user = json!({
                "userId": id,
                "firstName": name,
                "lastName": "User",
                // Cannot actually receive mail.
                "emailAddress": format!("{name}@users.noreply.github.com"),
                "status": "active",
                "password": password,
                "roles": [id],
            });
            self.transport
                .expect_success(
                    Method::POST,
                    &self.api("/security/users"),
                    self.auth(),
                    Some(Payload::json(user.to_string())),
                    "create repository user",
                )
                .await?;
            info!(name, user = %id, "created repository user");
        } else {
            debug!(user = %id, "repository user already exists");
        }

        Ok(())
    }

    async fn deprovision(&self, name: &str) -> Result<()> {
        let id = name.to_lowercase();

        self.delete_resource(&format!("/repositories/{id}"), "delete hosted repository")
            .await?;
        self.delete_resource(&format!("/security/roles/{id}"), "delete access role")
            .await?;
        self.delete_resource(&format!("/security/users/{id}"), "delete repository user")
            .await?;

        info!(name, "deprovisioned repository account");
        Ok(())
    }

    async fn change_password(&self, name: &str, new_password: &str) -> Result<()> {
        let id = name.to_lowercase();

        if self.query_user(&id).await?.is_none() {
            debug!(name, "user absent, degrading password change to provision");
            return self.provision(name, new_password).await;
        }

        let url = self.api(&format!("/security/users/{id}/change-password"));
        self.transport
            .expect_success(
                Method::PUT,
                &url,
                self.auth(),
                Some(Payload::text(new_password.to_string())),
                "change repository password",
            )
            .await?;
        info!(name, "changed repository password");
        Ok(())
    }

    async fn query_repository(&self, name: &str) -> Result<Option<Value>> {
        let url = self.api(&format!("/repositories/{}", name.to_lowercase()));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query hosted repository"));
        }
        let value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("repository resource: {e}")))?;
        Ok(Some(value))
    }

    async fn query_user(&self, name: &str) -> Result<Option<Value>> {
        let url = self.api(&format!("/security/users?userId={}", name.to_lowercase()));
        let response = self.transport.send(Method::GET, &url, self.auth(), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::remote(response.status, "query repository user"));
        }
        let users: Value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("user listing: {e}")))?;
        Ok(users.as_array().and_then(|list| list.first().cloned()))
    }

    fn repository_url(&self, name: &str) -> String {
        self.config.repository_url(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_list_is_scoped_to_the_repository() {
        let privileges = role_privileges("someuser");
        assert_eq!(privileges.len(), 6);
        assert!(privileges.contains(&"nx-repository-view-maven2-someuser-add".to_string()));
        assert!(privileges.contains(&"nx-repository-view-maven2-someuser-edit".to_string()));
        assert!(privileges.contains(&"nx-healthcheck-read".to_string()));
    }
}
