use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("environment already exists: {0}")]
    EnvironmentExists(String),

    #[error("invalid environment name '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("config error: {0}")]
    Config(#[from] azd_domain::DomainError),
}
