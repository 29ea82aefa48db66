//! Template store for the remote documents this crate submits.
//!
//! Templates are embedded at compile time and keyed by symbolic id; the
//! full id set is loaded once at construction. Substitution is literal
//! token replacement with no escaping: callers must make sure substituted
//! values are safe for the target document grammar.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Id of the CI account configuration template.
pub const USER_CONFIG: &str = "user-config";
/// Id of the freestyle job template.
pub const JOB_FREESTYLE: &str = "job-freestyle";
/// Id of the maven job template.
pub const JOB_MAVEN: &str = "job-maven";
/// Id of the credential entry template.
pub const CREDENTIALS: &str = "credentials";
/// Id of the credential domain template.
pub const CREDENTIALS_DOMAIN: &str = "credentials-domain";
/// Id of the build-settings fragment merged into account configurations.
pub const MAVEN_SETTINGS: &str = "maven-settings";

const TEMPLATES: &[(&str, &str)] = &[
    (USER_CONFIG, include_str!("../templates/jenkins/user-config.xml")),
    (JOB_FREESTYLE, include_str!("../templates/jenkins/job-freestyle.xml")),
    (JOB_MAVEN, include_str!("../templates/jenkins/job-maven.xml")),
    (CREDENTIALS, include_str!("../templates/jenkins/credentials.xml")),
    (
        CREDENTIALS_DOMAIN,
        include_str!("../templates/jenkins/credentials-domain.xml"),
    ),
    (MAVEN_SETTINGS, include_str!("../templates/jenkins/maven-settings.xml")),
];

/// Symbolic-id to document-template lookup, populated once at startup.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    cache: HashMap<&'static str, &'static str>,
}

impl TemplateStore {
    /// Load the fixed template set.
    pub fn load() -> Self {
        Self {
            cache: TEMPLATES.iter().copied().collect(),
        }
    }

    /// Look up a template by id.
    pub fn get(&self, id: &str) -> Result<&'static str> {
        self.cache
            .get(id)
            .copied()
            .ok_or_else(|| Error::TemplateNotFound(id.to_string()))
    }

    /// Render a template, replacing each `(placeholder, value)` pair
    /// literally. Unmatched placeholders are left verbatim.
    pub fn render(&self, id: &str, substitutions: &[(&str, &str)]) -> Result<String> {
        let mut document = self.get(id)?.to_string();
        for (placeholder, value) in substitutions {
            document = document.replace(placeholder, value);
        }
        Ok(document)
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::load()
    }
}
