use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unexpected template parameter type: '{0}'")]
    UnsupportedParameterType(String),

    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),

    #[error("invalid config path '{path}': {reason}")]
    InvalidConfigPath { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
