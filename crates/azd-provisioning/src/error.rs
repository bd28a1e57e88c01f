use std::path::PathBuf;

use azd_async::TaskError;
use azd_azure::AzureError;
use azd_domain::{DomainError, ProviderKind};
use azd_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<ProvisionError>,
    },

    /// The user answered "no" to a confirmation.
    #[error("{0}")]
    Declined(String),

    #[error("{0}")]
    NotSupported(String),

    #[error("provider '{0}' is not registered")]
    ProviderNotRegistered(ProviderKind),

    #[error("{0}")]
    Console(String),

    #[error("{tool} {command} failed: {message}")]
    Tool {
        tool: String,
        command: String,
        message: String,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template {path}: {message}")]
    InvalidTemplate { path: PathBuf, message: String },

    #[error("{0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Azure(#[from] AzureError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Errors raised by providers living in other crates.
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

impl ProvisionError {
    pub fn context(self, message: impl Into<String>) -> Self {
        ProvisionError::Context { message: message.into(), source: Box::new(self) }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io { path: path.into(), source }
    }

    /// Innermost error beneath any context wrappers.
    pub fn root(&self) -> &ProvisionError {
        match self {
            ProvisionError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self.root(), ProvisionError::Declined(_))
    }
}

/// Attach an operation prefix to any error convertible into [`ProvisionError`].
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T, ProvisionError>;

    fn with_context<F, S>(self, message: F) -> Result<T, ProvisionError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<ProvisionError>> ResultExt<T> for Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T, ProvisionError> {
        self.map_err(|e| e.into().context(message))
    }

    fn with_context<F, S>(self, message: F) -> Result<T, ProvisionError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message_and_keeps_root() {
        let err: Result<(), ProvisionError> =
            Err(ProvisionError::Declined("user denied delete confirmation".into()));
        let err = err.context("error deleting Azure resources").unwrap_err();
        assert_eq!(err.to_string(), "error deleting Azure resources: user denied delete confirmation");
        assert!(err.is_declined());
    }

    #[test]
    fn foreign_errors_convert_through_context() {
        let err: Result<(), AzureError> = Err(AzureError::DeploymentNotFound("dev".into()));
        let err = err.context("failed waiting for deployment").unwrap_err();
        assert!(matches!(err.root(), ProvisionError::Azure(AzureError::DeploymentNotFound(_))));
        assert_eq!(err.to_string(), "failed waiting for deployment: deployment not found: dev");
    }
}
