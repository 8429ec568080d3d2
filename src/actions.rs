//! Registry of named side-effect actions.
//!
//! Action steps refer to an action by name plus an optional list of
//! candidate targets. Resolution tries `"{target}.{action}"` for each
//! target in order, then the bare action name, and happens once when a
//! definition is loaded.

use std::collections::HashMap;
use std::fmt;

type ActionFn = Box<dyn FnMut(&[String])>;

/// Named callables that action steps invoke on completion
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionFn>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.actions.keys().collect();
        keys.sort();
        f.debug_struct("ActionRegistry").field("actions", &keys).finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an action under `key`
    pub fn register(&mut self, key: impl Into<String>, action: impl FnMut(&[String]) + 'static) {
        self.actions.insert(key.into(), Box::new(action));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.actions.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Resolve an action name against candidate targets.
    ///
    /// Returns the registry key that matched first.
    pub fn resolve(&self, action: &str, targets: &[String]) -> Option<String> {
        targets
            .iter()
            .map(|target| format!("{}.{}", target, action))
            .chain(std::iter::once(action.to_string()))
            .find(|key| self.actions.contains_key(key))
    }

    /// Invoke a resolved action. Returns false if nothing is registered under `key`.
    pub fn invoke(&mut self, key: &str, args: &[String]) -> bool {
        match self.actions.get_mut(key) {
            Some(action) => {
                tracing::debug!(action = key, ?args, "invoking action");
                action(args);
                true
            }
            None => {
                tracing::warn!(action = key, "action not registered, skipping");
                false
            }
        }
    }
}
