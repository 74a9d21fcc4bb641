/*
 * templates.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named templates available to `prompty.include`.

use std::sync::Arc;

use crate::error::{RegistryError, RegistryKind};
use crate::parser::Template;
use crate::registry::Registry;

/// Registry of parsed templates, keyed by name.
///
/// Stored templates are not bound to an engine; an include always executes
/// with the engine running the including template.
#[derive(Debug)]
pub struct TemplateRegistry {
    inner: Registry<Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(RegistryKind::Template),
        }
    }

    /// Register a parsed template under `name`. The first registration wins.
    pub fn register(&self, name: &str, mut template: Template) -> Result<(), RegistryError> {
        template.engine = None;
        self.inner.register(name, Arc::new(template.with_name(name)))
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.inner.unregister(name).map(|_| ())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.inner.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    /// Sorted snapshot of registered template names.
    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_template() {
        let registry = TemplateRegistry::new();
        registry
            .register("greeting", Template::parse("Hello").unwrap())
            .unwrap();

        let template = registry.get("greeting").unwrap();
        assert_eq!(template.name(), Some("greeting"));
        assert_eq!(template.source(), "Hello");
        assert!(registry.has("greeting"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_template_name() {
        let registry = TemplateRegistry::new();
        registry.register("a", Template::parse("one").unwrap()).unwrap();
        let err = registry
            .register("a", Template::parse("two").unwrap())
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(registry.get("a").unwrap().source(), "one");
    }

    #[test]
    fn test_reserved_template_name() {
        let registry = TemplateRegistry::new();
        assert!(matches!(
            registry.register("prompty.base", Template::parse("").unwrap()),
            Err(RegistryError::ReservedName { .. })
        ));
    }

    #[test]
    fn test_unregister_and_list() {
        let registry = TemplateRegistry::new();
        registry.register("b", Template::parse("").unwrap()).unwrap();
        registry.register("a", Template::parse("").unwrap()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);

        registry.unregister("a").unwrap();
        assert_eq!(registry.names(), vec!["b"]);
        assert!(matches!(
            registry.unregister("a"),
            Err(RegistryError::NotFound { .. })
        ));
    }
}
