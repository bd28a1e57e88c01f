//! Azure resource type names and their user-facing display names.

pub const API_MANAGEMENT: &str = "Microsoft.ApiManagement/service";
pub const APP_CONFIGURATION: &str = "Microsoft.AppConfiguration/configurationStores";
pub const APP_INSIGHTS: &str = "Microsoft.Insights/components";
pub const CACHE_FOR_REDIS: &str = "Microsoft.Cache/redis";
pub const CDN_PROFILE: &str = "Microsoft.Cdn/profiles";
pub const CONTAINER_APP: &str = "Microsoft.App/containerApps";
pub const CONTAINER_APP_ENVIRONMENT: &str = "Microsoft.App/managedEnvironments";
pub const CONTAINER_REGISTRY: &str = "Microsoft.ContainerRegistry/registries";
pub const COSMOS_DB: &str = "Microsoft.DocumentDB/databaseAccounts";
pub const DEPLOYMENT: &str = "Microsoft.Resources/deployments";
pub const DEV_CENTER: &str = "Microsoft.DevCenter/devcenters";
pub const DEV_CENTER_PROJECT: &str = "Microsoft.DevCenter/projects";
pub const EVENT_HUBS_NAMESPACE: &str = "Microsoft.EventHub/namespaces";
pub const KEY_VAULT: &str = "Microsoft.KeyVault/vaults";
pub const LOG_ANALYTICS_WORKSPACE: &str = "Microsoft.OperationalInsights/workspaces";
pub const MANAGED_CLUSTER: &str = "Microsoft.ContainerService/managedClusters";
pub const PORTAL_DASHBOARD: &str = "Microsoft.Portal/dashboards";
pub const POSTGRESQL_SERVER: &str = "Microsoft.DBforPostgreSQL/flexibleServers";
pub const RESOURCE_GROUP: &str = "Microsoft.Resources/resourceGroups";
pub const SERVICE_BUS_NAMESPACE: &str = "Microsoft.ServiceBus/namespaces";
pub const SERVICE_PLAN: &str = "Microsoft.Web/serverfarms";
pub const SQL_SERVER: &str = "Microsoft.Sql/servers";
pub const STATIC_WEB_SITE: &str = "Microsoft.Web/staticSites";
pub const STORAGE_ACCOUNT: &str = "Microsoft.Storage/storageAccounts";
pub const WEB_SITE: &str = "Microsoft.Web/sites";

/// Display name for `resource_type`, or `None` for types that are not shown
/// to the user (deployments, role assignments, unknown types).
pub fn display_name(resource_type: &str) -> Option<&'static str> {
    let name = match resource_type {
        t if t.eq_ignore_ascii_case(RESOURCE_GROUP) => "Resource group",
        t if t.eq_ignore_ascii_case(STORAGE_ACCOUNT) => "Storage account",
        t if t.eq_ignore_ascii_case(KEY_VAULT) => "Key Vault",
        t if t.eq_ignore_ascii_case(PORTAL_DASHBOARD) => "Portal dashboard",
        t if t.eq_ignore_ascii_case(APP_INSIGHTS) => "Application Insights",
        t if t.eq_ignore_ascii_case(LOG_ANALYTICS_WORKSPACE) => "Log Analytics workspace",
        t if t.eq_ignore_ascii_case(WEB_SITE) => "Web App",
        t if t.eq_ignore_ascii_case(STATIC_WEB_SITE) => "Static Web App",
        t if t.eq_ignore_ascii_case(CONTAINER_APP) => "Container App",
        t if t.eq_ignore_ascii_case(CONTAINER_APP_ENVIRONMENT) => "Container Apps Environment",
        t if t.eq_ignore_ascii_case(SERVICE_BUS_NAMESPACE) => "Service Bus Namespace",
        t if t.eq_ignore_ascii_case(EVENT_HUBS_NAMESPACE) => "Event Hubs Namespace",
        t if t.eq_ignore_ascii_case(SERVICE_PLAN) => "App Service plan",
        t if t.eq_ignore_ascii_case(COSMOS_DB) => "Azure Cosmos DB",
        t if t.eq_ignore_ascii_case(API_MANAGEMENT) => "API Management",
        t if t.eq_ignore_ascii_case(CACHE_FOR_REDIS) => "Cache for Redis",
        t if t.eq_ignore_ascii_case(SQL_SERVER) => "Azure SQL Server",
        t if t.eq_ignore_ascii_case(POSTGRESQL_SERVER) => "Azure Database for PostgreSQL flexible server",
        t if t.eq_ignore_ascii_case(CDN_PROFILE) => "Azure Front Door / CDN profile",
        t if t.eq_ignore_ascii_case(APP_CONFIGURATION) => "App Configuration",
        t if t.eq_ignore_ascii_case(CONTAINER_REGISTRY) => "Container registry",
        t if t.eq_ignore_ascii_case(MANAGED_CLUSTER) => "AKS Managed Cluster",
        t if t.eq_ignore_ascii_case(DEV_CENTER) => "Dev Center",
        t if t.eq_ignore_ascii_case(DEV_CENTER_PROJECT) => "Dev Center project",
        _ => return None,
    };
    Some(name)
}
