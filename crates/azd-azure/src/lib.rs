//! Narrow interfaces over the Azure control and data planes, plus REST
//! implementations of them.

pub mod account;
pub mod arm;
pub mod auth;
pub mod deployments;
pub mod devcenter;
pub mod error;
pub mod resource_types;
pub mod resources;
pub mod scope;

pub use account::{AccountService, Location, Subscription};
pub use arm::ArmClient;
pub use auth::{default_credential, StaticToken, TokenCache, TokenCredential};
pub use deployments::{
    DeploymentExtended, DeploymentOperation, DeploymentOutput, DeploymentProperties, DeploymentService,
    DeploymentTarget, OperationProperties, TargetResource, WhatIfChange,
};
pub use devcenter::{
    Catalog, DefinitionParameter, DefinitionParameterType, DevCenter, DevCenterClient,
    DevCenterEnvironment, DevCenterRestClient, EnvironmentDefinition, EnvironmentSpec,
    EnvironmentType, Project,
};
pub use error::AzureError;
pub use resources::{
    ApiManagement, AppConfiguration, AzureResource, KeyVault, ResourceGroupId, ResourceService,
};
pub use scope::Scope;
