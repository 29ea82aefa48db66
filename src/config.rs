//! Configuration objects for the two remote services.
//!
//! Each manager receives its configuration at construction, so multiple
//! targets (or test doubles) can coexist in one process.

use serde::{Deserialize, Serialize};

/// Connection details for the CI server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiServerConfig {
    /// Base URL of the CI server, e.g. `https://ci.example.org`.
    pub url: String,
    /// Username of the API account.
    pub username: String,
    /// API token for the account.
    pub token: String,
}

impl CiServerConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: trim_url(url.into()),
            username: username.into(),
            token: token.into(),
        }
    }
}

/// Connection details for the artifact-repository manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoManagerConfig {
    /// Base URL of the repository manager, e.g. `https://repo.example.org`.
    pub url: String,
    /// Username of the admin account.
    pub username: String,
    /// Password of the admin account.
    pub password: String,
}

impl RepoManagerConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: trim_url(url.into()),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Root of the REST API surface.
    pub fn api_url(&self) -> String {
        format!("{}/service/rest/v1", self.url)
    }

    /// Public URL of the hosted repository derived from `name`.
    pub fn repository_url(&self, name: &str) -> String {
        format!("{}/repository/{}/", self.url, name.to_lowercase())
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
