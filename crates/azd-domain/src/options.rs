use serde::{Deserialize, Serialize};

use crate::types::ProviderKind;

pub const DEFAULT_INFRA_PATH: &str = "infra";
pub const DEFAULT_MODULE: &str = "main";

/// The `infra:` section of the project file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
}

impl Options {
    /// Fill empty fields from `others` in order, then from the built-in
    /// defaults. The first non-empty value for each field wins.
    pub fn with_defaults(&self, others: &[Options]) -> Options {
        let layers = std::iter::once(self).chain(others.iter());

        let mut merged = Options::default();
        for layer in layers {
            if merged.provider.is_none() {
                merged.provider = layer.provider;
            }
            if merged.path.trim().is_empty() {
                merged.path = layer.path.clone();
            }
            if merged.module.trim().is_empty() {
                merged.module = layer.module.clone();
            }
        }

        if merged.path.trim().is_empty() {
            merged.path = DEFAULT_INFRA_PATH.to_string();
        }
        if merged.module.trim().is_empty() {
            merged.module = DEFAULT_MODULE.to_string();
        }
        merged
    }
}
