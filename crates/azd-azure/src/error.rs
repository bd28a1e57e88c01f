use thiserror::Error;

#[derive(Debug, Error)]
pub enum AzureError {
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{method} {url}: status {status}: {message}")]
    Api {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },

    #[error("request failed: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("invalid resource id '{0}'")]
    InvalidResourceId(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}
