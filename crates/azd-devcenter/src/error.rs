use azd_azure::AzureError;
use azd_domain::DomainError;
use azd_provisioning::ProvisionError;
use azd_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevCenterError {
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<DevCenterError>,
    },

    /// A required config value is missing; names the field.
    #[error("missing required devcenter config value '{0}'")]
    MissingConfig(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid value for environment variable {name}: {message}")]
    InvalidOverride { name: String, message: String },

    #[error("{0}")]
    InvalidParameter(String),

    /// Several independent operations failed.
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<DevCenterError>),

    #[error(transparent)]
    Azure(#[from] AzureError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

fn join_messages(errors: &[DevCenterError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl DevCenterError {
    pub fn context(self, message: impl Into<String>) -> Self {
        DevCenterError::Context { message: message.into(), source: Box::new(self) }
    }

    /// Innermost error beneath any context wrappers.
    pub fn root(&self) -> &DevCenterError {
        match self {
            DevCenterError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<DevCenterError> for ProvisionError {
    fn from(err: DevCenterError) -> Self {
        match err {
            DevCenterError::Provision(inner) => inner,
            other => ProvisionError::External(Box::new(other)),
        }
    }
}

pub(crate) trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T, DevCenterError>;
}

impl<T, E: Into<DevCenterError>> ResultExt<T> for Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T, DevCenterError> {
        self.map_err(|e| e.into().context(message))
    }
}
