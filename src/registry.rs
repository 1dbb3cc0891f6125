use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::error::DecodeError;
use crate::object::{Kind, Object};

/// Zero-argument record constructor.
pub type Ctor = fn() -> Object;

/// Maps kind names to constructors so stored data decodes into the right kind.
///
/// Shared between threads; every access goes through the inner lock.
pub struct Registry {
    ctors: RwLock<HashMap<String, Ctor>>,
}

impl Registry {
    /// Registry holding only the base [`Object`] kind.
    pub fn new() -> Self {
        let registry = Self {
            ctors: RwLock::new(HashMap::new()),
        };
        registry.add(Object::new);
        registry
    }

    /// Register a constructor under the kind of the record it builds and
    /// return that name. Re-registering a name replaces the old one.
    pub fn add(&self, ctor: Ctor) -> String {
        let name = ctor().kind().to_string();
        debug!(kind = %name, "registering kind");
        self.ctors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), ctor);
        name
    }

    pub fn add_kind<K: Kind>(&self) -> String {
        self.add(K::template)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Build a fresh record of `name`, failing for unregistered kinds.
    pub fn construct(&self, name: &str) -> Result<Object, DecodeError> {
        let ctor = self
            .ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .ok_or_else(|| DecodeError::UnknownKind(name.to_string()))?;
        Ok(ctor())
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.ctors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical kind name of a record.
pub fn kind(obj: &Object) -> &str {
    obj.kind()
}
