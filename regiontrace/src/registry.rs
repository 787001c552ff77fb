//! Module registry
//!
//! The set of modules the host has loaded. Hosts append to it as modules come
//! into play; the function group writer reads it once at shutdown.

use std::sync::{Arc, PoisonError, RwLock};

/// Shared, append-only set of module names
///
/// Cloning shares the same underlying set. Only identical names collapse;
/// the same code loaded under two different names stays listed twice.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<RwLock<Vec<String>>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loaded module. Returns false if it was already known.
    pub fn insert(&self, module: &str) -> bool {
        if self.contains(module) {
            return false;
        }
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock, another thread may have won the race.
        if modules.iter().any(|m| m == module) {
            return false;
        }
        modules.push(module.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|m| m == module)
    }

    /// Copy of the current contents, in load order
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: AsRef<str>> FromIterator<S> for ModuleRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let registry = Self::new();
        for module in iter {
            registry.insert(module.as_ref());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_load_order() {
        let registry = ModuleRegistry::new();
        assert!(registry.insert("sys"));
        assert!(registry.insert("__main__"));
        assert!(registry.insert("helpers"));
        assert_eq!(registry.snapshot(), vec!["sys", "__main__", "helpers"]);
    }

    #[test]
    fn test_identical_names_collapse() {
        let registry = ModuleRegistry::new();
        assert!(registry.insert("helpers"));
        assert!(!registry.insert("helpers"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_aliases_are_preserved() {
        let registry: ModuleRegistry = ["np", "numpy"].into_iter().collect();
        assert_eq!(registry.snapshot(), vec!["np", "numpy"]);
    }

    #[test]
    fn test_clones_share_contents() {
        let registry = ModuleRegistry::new();
        let shared = registry.clone();
        shared.insert("worker");
        assert!(registry.contains("worker"));
    }
}
