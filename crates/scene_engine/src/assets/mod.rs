//! Asset storage
//!
//! Meshes and materials are registered by name in explicitly constructed
//! libraries and referred to by generational handles. Loading them from
//! files is left to the application; the engine only consumes the
//! in-memory descriptions.

pub mod material_library;
pub mod mesh;

use std::collections::HashMap;

use thiserror::Error;

use crate::foundation::collections::{Key, SlotMap};

pub use material_library::MaterialLibrary;
pub use mesh::{GeometryBinding, Mesh, MeshLibrary, SubMesh};

/// Asset registration errors
#[derive(Debug, Error)]
pub enum AssetError {
    /// An asset of the same kind already uses this name
    #[error("Asset name already registered: {0}")]
    DuplicateName(String),

    /// The material cannot be drawn as configured
    #[error("Invalid material '{name}': {reason}")]
    InvalidMaterial {
        /// Material name
        name: String,
        /// Validation failure
        reason: String,
    },
}

/// Name-indexed arena of assets
#[derive(Debug)]
pub struct AssetStore<K: Key, T> {
    items: SlotMap<K, T>,
    names: HashMap<String, K>,
}

impl<K: Key, T> AssetStore<K, T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    /// Register an asset under a unique name
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Result<K, AssetError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(AssetError::DuplicateName(name));
        }
        let key = self.items.insert(item);
        self.names.insert(name, key);
        Ok(key)
    }

    /// Look up an asset by handle
    pub fn get(&self, key: K) -> Option<&T> {
        self.items.get(key)
    }

    /// Look up an asset by handle for modification
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    /// Handle of the asset registered under `name`
    pub fn find(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    /// Drop the asset registered under `name`; false if there is none
    pub fn unload(&mut self, name: &str) -> bool {
        match self.names.remove(name) {
            Some(key) => self.items.remove(key).is_some(),
            None => false,
        }
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over all assets
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.items.iter()
    }
}

impl<K: Key, T> Default for AssetStore<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every asset library a frame needs, passed by reference
#[derive(Debug)]
pub struct Resources {
    /// Registered meshes
    pub meshes: MeshLibrary,
    /// Registered materials
    pub materials: MaterialLibrary,
}

impl Resources {
    /// Empty libraries (plus the built-in debug material)
    pub fn new() -> Self {
        Self {
            meshes: MeshLibrary::new(),
            materials: MaterialLibrary::new(),
        }
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::MeshId;

    #[test]
    fn test_store_rejects_duplicate_names() {
        let mut store: AssetStore<MeshId, u32> = AssetStore::new();
        let first = store.insert("a", 1).unwrap();
        assert!(matches!(store.insert("a", 2), Err(AssetError::DuplicateName(_))));
        assert_eq!(store.get(first), Some(&1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unload_invalidates_handle() {
        let mut store: AssetStore<MeshId, u32> = AssetStore::new();
        let key = store.insert("a", 7).unwrap();

        assert!(store.unload("a"));
        assert!(!store.unload("a"));
        assert!(store.get(key).is_none());
        assert!(store.find("a").is_none());

        // The name can be reused and the stale handle stays dead.
        let again = store.insert("a", 8).unwrap();
        assert_ne!(key, again);
        assert!(store.get(key).is_none());
    }
}
