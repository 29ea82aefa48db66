//! Error types shared by all managers.
//!
//! Absence of a remote resource is never an error: query operations return
//! `Option`. The variants here cover transport faults, non-success remote
//! statuses, missing templates and malformed remote documents.

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the CI server or the repository
/// manager.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request could not be sent or the response could not be read.
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("remote call failed with status {status}: {context}")]
    Remote {
        /// HTTP status code returned by the service
        status: u16,
        /// What was being attempted
        context: String,
    },

    /// A required document template is not present in the store.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// A fetched remote document is missing the structure an operation
    /// needs to patch it.
    #[error("malformed remote document: {0}")]
    MalformedDocument(String),

    /// A structured response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl Error {
    /// Create a [`Error::Remote`] from a status code and a description of
    /// the attempted operation.
    pub fn remote(status: u16, context: impl Into<String>) -> Self {
        Self::Remote {
            status,
            context: context.into(),
        }
    }

    /// Whether this error is a 409 conflict from the remote service.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Remote { status: 409, .. })
    }

    /// Whether this error is a 4xx response.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Remote { status, .. } if *status >= 400 && *status < 500)
    }

    /// Whether this error is a 5xx response.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Remote { status, .. } if *status >= 500)
    }
}
