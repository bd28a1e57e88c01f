//! Where a dev center environment lives, merged from every place azd reads
//! settings from.

use azd_domain::ConfigTree;
use azd_store::Environment;
use serde::{Deserialize, Serialize};

use crate::error::DevCenterError;

/// `platform.type` value selecting the dev center provider.
pub const PLATFORM_KIND: &str = "devcenter";

pub const CONFIG_PATH: &str = "platform.config";
pub const NAME_PATH: &str = "platform.config.name";
pub const CATALOG_PATH: &str = "platform.config.catalog";
pub const PROJECT_PATH: &str = "platform.config.project";
pub const ENVIRONMENT_TYPE_PATH: &str = "platform.config.environmentType";
pub const ENVIRONMENT_DEFINITION_PATH: &str = "platform.config.environmentDefinition";
pub const USER_PATH: &str = "platform.config.user";

pub const NAME_ENV: &str = "AZURE_DEVCENTER_NAME";
pub const CATALOG_ENV: &str = "AZURE_DEVCENTER_CATALOG";
pub const PROJECT_ENV: &str = "AZURE_DEVCENTER_PROJECT";
pub const ENVIRONMENT_TYPE_ENV: &str = "AZURE_DEVCENTER_ENVIRONMENT_TYPE";
pub const ENVIRONMENT_DEFINITION_ENV: &str = "AZURE_DEVCENTER_ENVIRONMENT_DEFINITION";
pub const USER_ENV: &str = "AZURE_DEVCENTER_ENVIRONMENT_USER";

/// Environments are created on behalf of the signed-in user unless told otherwise.
pub const DEFAULT_USER: &str = "me";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub catalog: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub environment_type: String,
    #[serde(default)]
    pub environment_definition: String,
    #[serde(default)]
    pub user: String,
}

impl Config {
    /// Read the fields found under `prefix` in `tree`. An empty prefix reads
    /// top-level keys, which is how the project file's `platform.config`
    /// section is handed over.
    pub fn from_tree(tree: &ConfigTree, prefix: &str) -> Self {
        let get = |key: &str| {
            let path = if prefix.is_empty() { key.to_string() } else { format!("{}.{}", prefix, key) };
            tree.get_string(&path).unwrap_or_default().to_string()
        };
        Self {
            name: get("name"),
            catalog: get("catalog"),
            project: get("project"),
            environment_type: get("environmentType"),
            environment_definition: get("environmentDefinition"),
            user: get("user"),
        }
    }

    /// Read the `AZURE_DEVCENTER_*` values through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default();
        Self {
            name: get(NAME_ENV),
            catalog: get(CATALOG_ENV),
            project: get(PROJECT_ENV),
            environment_type: get(ENVIRONMENT_TYPE_ENV),
            environment_definition: get(ENVIRONMENT_DEFINITION_ENV),
            user: get(USER_ENV),
        }
    }

    /// Fill every empty field from `other`.
    pub fn or(mut self, other: &Config) -> Self {
        let fill = |mine: &mut String, theirs: &String| {
            if mine.is_empty() {
                mine.clone_from(theirs);
            }
        };
        fill(&mut self.name, &other.name);
        fill(&mut self.catalog, &other.catalog);
        fill(&mut self.project, &other.project);
        fill(&mut self.environment_type, &other.environment_type);
        fill(&mut self.environment_definition, &other.environment_definition);
        fill(&mut self.user, &other.user);
        self
    }

    /// The effective config: environment variables, then the environment's
    /// own config, then the project file, then the user config. The first
    /// non-empty value of each field wins.
    pub fn resolve(env: &Environment, project: &ConfigTree, user: &ConfigTree) -> Self {
        Config::from_env(|key| env.lookup_env(key))
            .or(&Config::from_tree(env.config(), CONFIG_PATH))
            .or(&Config::from_tree(project, ""))
            .or(&Config::from_tree(user, CONFIG_PATH))
    }

    pub fn ensure_valid(&self) -> Result<(), DevCenterError> {
        if self.name.is_empty() {
            return Err(DevCenterError::MissingConfig("name"));
        }
        if self.project.is_empty() {
            return Err(DevCenterError::MissingConfig("project"));
        }
        if self.environment_definition.is_empty() {
            return Err(DevCenterError::MissingConfig("environmentDefinition"));
        }
        Ok(())
    }

    /// `(path, value)` for each field set here but empty in `before`.
    pub(crate) fn added_since(&self, before: &Config) -> Vec<(&'static str, &str)> {
        [
            (NAME_PATH, &before.name, &self.name),
            (CATALOG_PATH, &before.catalog, &self.catalog),
            (PROJECT_PATH, &before.project, &self.project),
            (ENVIRONMENT_TYPE_PATH, &before.environment_type, &self.environment_type),
            (ENVIRONMENT_DEFINITION_PATH, &before.environment_definition, &self.environment_definition),
            (USER_PATH, &before.user, &self.user),
        ]
        .into_iter()
        .filter(|(_, old, new)| old.is_empty() && !new.is_empty())
        .map(|(path, _, new)| (path, new.as_str()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> ConfigTree {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn first_non_empty_source_wins() {
        let mut env = Environment::new("dev");
        env.dotenv_set(PROJECT_ENV, "from-env-var");
        env.config_mut().set(NAME_PATH, "dc-env").unwrap();
        env.config_mut().set(PROJECT_PATH, "from-env-config").unwrap();

        let project = tree(json!({ "name": "dc-project", "catalog": "cat-project", "environmentDefinition": "" }));
        let user = tree(json!({ "platform": { "config": {
            "catalog": "cat-user", "environmentDefinition": "web", "user": "someone"
        } } }));

        let config = Config::resolve(&env, &project, &user);
        assert_eq!(
            config,
            Config {
                name: "dc-env".into(),
                catalog: "cat-project".into(),
                project: "from-env-var".into(),
                environment_type: String::new(),
                environment_definition: "web".into(),
                user: "someone".into(),
            }
        );
        assert!(config.ensure_valid().is_ok());
    }

    #[test]
    fn validation_names_the_missing_field() {
        let config = Config { name: "dc".into(), ..Default::default() };
        assert!(matches!(config.ensure_valid(), Err(DevCenterError::MissingConfig("project"))));

        let config = Config { name: "dc".into(), project: "p".into(), ..Default::default() };
        let err = config.ensure_valid().unwrap_err();
        assert_eq!(err.to_string(), "missing required devcenter config value 'environmentDefinition'");
    }

    #[test]
    fn only_newly_filled_fields_are_reported() {
        let before = Config { name: "dc".into(), ..Default::default() };
        let after = Config {
            name: "other".into(),
            project: "p".into(),
            user: DEFAULT_USER.into(),
            ..Default::default()
        };
        assert_eq!(after.added_since(&before), vec![(PROJECT_PATH, "p"), (USER_PATH, "me")]);
    }
}
