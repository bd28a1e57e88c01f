use std::collections::HashMap;

use azd_domain::ProviderKind;

use crate::error::ProvisionError;
use crate::provider::Provider;

type Factory = Box<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

/// Maps a [`ProviderKind`] to a constructor for that provider.
///
/// Built once at startup and handed to the manager. Factories capture the
/// collaborators their provider needs, so creating a provider is infallible.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, Factory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `kind`. Returns `&mut self` for chaining.
    pub fn register<F>(&mut self, kind: ProviderKind, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
        self
    }

    /// A fresh, uninitialized provider of `kind`.
    pub fn create(&self, kind: ProviderKind) -> Result<Box<dyn Provider>, ProvisionError> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or(ProvisionError::ProviderNotRegistered(kind))
    }

    /// Every kind that has a registered factory.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("kinds", &self.kinds()).finish()
    }
}
