//! Declared task definitions.

use tracing::warn;

use crate::config::SchedulerConfig;
use crate::types::TaskDefinition;

/// Ordered set of task definitions under one namespace.
///
/// Hook keys are not unique. Registering the same name twice keeps both
/// definitions and lookups return the first.
#[derive(Debug, Default)]
pub struct Registry {
    prefix: String,
    separator: String,
    definitions: Vec<TaskDefinition>,
}

impl Registry {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            separator: config.separator.clone(),
            definitions: Vec::new(),
        }
    }

    /// The namespaced hook key for a short name.
    pub fn hook_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.prefix, self.separator, name)
        }
    }

    /// Append a definition, assigning its namespaced hook key.
    pub fn push(&mut self, mut def: TaskDefinition) -> &TaskDefinition {
        def.hook = self.hook_name(&def.name);
        if self.definitions.iter().any(|d| d.hook == def.hook) {
            warn!(hook = %def.hook, "hook registered more than once, lookups use the first");
        }
        self.definitions.push(def);
        &self.definitions[self.definitions.len() - 1]
    }

    /// First definition registered under `name`.
    pub fn find(&self, name: &str) -> Option<&TaskDefinition> {
        let hook = self.hook_name(name);
        self.definitions.iter().find(|d| d.hook == hook)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut TaskDefinition> {
        let hook = self.hook_name(name);
        self.definitions.iter_mut().find(|d| d.hook == hook)
    }

    /// Remove every definition registered under `name`. Returns how many were removed.
    pub fn clear(&mut self, name: &str) -> usize {
        let hook = self.hook_name(name);
        self.remove_if(|d| d.hook == hook)
    }

    /// Definitions matching `predicate`, in registration order.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<&TaskDefinition>
    where
        P: FnMut(&TaskDefinition) -> bool,
    {
        self.definitions.iter().filter(|d| predicate(d)).collect()
    }

    /// Remove definitions matching `predicate`. Returns how many were removed.
    pub fn remove_if<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&TaskDefinition) -> bool,
    {
        let before = self.definitions.len();
        self.definitions.retain(|d| !predicate(d));
        before - self.definitions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Distinct hook keys in first-registration order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::with_capacity(self.definitions.len());
        for def in &self.definitions {
            if !keys.contains(&def.hook) {
                keys.push(def.hook.clone());
            }
        }
        keys
    }
}
