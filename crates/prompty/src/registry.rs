/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Shared storage for the resolver, function and template registries.
 */

//! Name-keyed storage shared by the three registries.
//!
//! Every registry follows the same rules:
//!
//! - the first registration of a name wins; a second one is an error
//! - names starting with [`RESERVED_PREFIX`] are refused from outside callers
//! - built-in entries cannot be unregistered
//! - listing returns a sorted snapshot, so readers never observe a
//!   registration in progress
//!
//! Entries are held as `Arc<T>` so a lookup can release the lock before the
//! entry is used.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RegistryError, RegistryKind};

/// Prefix reserved for built-in tags.
pub const RESERVED_PREFIX: &str = "prompty.";

pub(crate) struct Registry<T: ?Sized> {
    kind: RegistryKind,
    entries: RwLock<HashMap<String, Arc<T>>>,
    builtins: HashSet<String>,
}

impl<T: ?Sized> Registry<T> {
    pub(crate) fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
            builtins: HashSet::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a built-in entry. Skips the reserved-name check.
    pub(crate) fn insert_builtin(&mut self, name: &str, entry: Arc<T>) {
        self.builtins.insert(name.to_string());
        self.entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry);
    }

    /// Mark a name as built-in without storing an entry for it.
    ///
    /// Used for tags the executor implements itself.
    pub(crate) fn reserve_builtin(&mut self, name: &str) {
        self.builtins.insert(name.to_string());
    }

    pub(crate) fn register(&self, name: &str, entry: Arc<T>) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName { kind: self.kind });
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(RegistryError::ReservedName {
                kind: self.kind,
                name: name.to_string(),
            });
        }

        let mut entries = self.write();
        if entries.contains_key(name) || self.builtins.contains(name) {
            return Err(RegistryError::AlreadyRegistered {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        entries.insert(name.to_string(), entry);
        drop(entries);

        tracing::debug!(kind = %self.kind, name, "Registered");
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        if self.builtins.contains(name) {
            return Err(RegistryError::BuiltIn {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        let removed = self.write().remove(name);
        match removed {
            Some(entry) => {
                tracing::debug!(kind = %self.kind, name, "Unregistered");
                Ok(entry)
            }
            None => Err(RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<T>> {
        self.read().get(name).cloned()
    }

    /// Whether `name` is bound, either to a stored entry or as a built-in.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.builtins.contains(name) || self.read().contains_key(name)
    }

    /// Sorted snapshot of every bound name, built-ins included.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        for builtin in &self.builtins {
            if !names.contains(builtin) {
                names.push(builtin.clone());
            }
        }
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.names().len()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry<str> {
        let mut registry = Registry::new(RegistryKind::Function);
        registry.insert_builtin("len", Arc::from("builtin"));
        registry.reserve_builtin("prompty.include");
        registry.reserve_builtin("now");
        registry
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = registry();
        registry.register("echo", Arc::from("first")).unwrap();

        let err = registry.register("echo", Arc::from("second")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(registry.get("echo").as_deref(), Some("first"));
    }

    #[test]
    fn test_reserved_and_empty_names() {
        let registry = registry();
        assert!(matches!(
            registry.register("prompty.custom", Arc::from("x")),
            Err(RegistryError::ReservedName { .. })
        ));
        assert!(matches!(
            registry.register("prompty.include", Arc::from("x")),
            Err(RegistryError::ReservedName { .. })
        ));
        assert!(matches!(
            registry.register("", Arc::from("x")),
            Err(RegistryError::EmptyName { .. })
        ));
        // Built-ins collide like any other name
        assert!(matches!(
            registry.register("len", Arc::from("x")),
            Err(RegistryError::AlreadyRegistered { .. })
        ));
        assert!(matches!(
            registry.register("now", Arc::from("x")),
            Err(RegistryError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_unregister() {
        let registry = registry();
        registry.register("echo", Arc::from("x")).unwrap();

        assert!(registry.unregister("echo").is_ok());
        assert!(!registry.contains("echo"));
        assert!(matches!(
            registry.unregister("echo"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.unregister("len"),
            Err(RegistryError::BuiltIn { .. })
        ));
        assert!(matches!(
            registry.unregister("prompty.include"),
            Err(RegistryError::BuiltIn { .. })
        ));
    }

    #[test]
    fn test_names_are_sorted_snapshot() {
        let registry = registry();
        registry.register("zeta", Arc::from("z")).unwrap();
        registry.register("alpha", Arc::from("a")).unwrap();

        let names = registry.names();
        assert_eq!(names, vec!["alpha", "len", "now", "prompty.include", "zeta"]);

        // The snapshot is unaffected by later registrations
        registry.register("beta", Arc::from("b")).unwrap();
        assert_eq!(names.len(), 5);
        assert_eq!(registry.len(), 6);
    }
}
