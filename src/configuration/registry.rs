use std::collections::HashMap;

use ardu_configurator_core::parameters::ParameterSet;

use crate::error::PluginError;

/// Extra behavior attached to a configuration step
///
/// A fresh instance is created when a step naming the plugin is loaded
/// and deactivated when the engine leaves that step.
pub trait StepPlugin {
    fn name(&self) -> &str;

    /// Called after the step file is loaded
    fn activate(&mut self, step_file: &str, fc_parameters: &ParameterSet)
        -> Result<(), PluginError>;

    /// Called before the engine leaves the step
    fn deactivate(&mut self);
}

/// Creates plugin instances
pub type PluginFactory = Box<dyn Fn() -> Box<dyn StepPlugin> + Send + Sync>;

/// Registry of step plugin factories, owned by the composition root.
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory. Returns error if a plugin with the same name exists.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: PluginFactory,
    ) -> Result<(), PluginError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(PluginError::AlreadyRegistered(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Unregister a plugin by name. Returns error if not found.
    pub fn unregister(&mut self, name: &str) -> Result<(), PluginError> {
        if self.factories.remove(name).is_none() {
            return Err(PluginError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// List all registered plugin names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create a new instance of a plugin by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn StepPlugin>, PluginError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
