//! Material registration
//!
//! Registered materials get a unique sort id used as the material identity
//! in render-queue keys, and are validated so that configuration mistakes
//! surface at setup instead of mid-frame.

use crate::assets::{AssetError, AssetStore};
use crate::foundation::collections::MaterialId;
use crate::render::material::Material;
use crate::render::shader::ShaderKind;

const DEBUG_WIREFRAME_MATERIAL: &str = "__debug_wireframe";

/// Registered materials
#[derive(Debug)]
pub struct MaterialLibrary {
    store: AssetStore<MaterialId, Material>,
    next_sort_id: u32,
    debug_wireframe: MaterialId,
}

impl MaterialLibrary {
    /// Library containing only the built-in debug wireframe material
    pub fn new() -> Self {
        let mut store = AssetStore::new();
        let mut debug = Material::new(DEBUG_WIREFRAME_MATERIAL, ShaderKind::Wireframe);
        debug.sort_id = 1;
        let debug_wireframe = match store.insert(DEBUG_WIREFRAME_MATERIAL, debug) {
            Ok(id) => id,
            // An empty store cannot hold the name yet.
            Err(_) => MaterialId::default(),
        };
        Self {
            store,
            next_sort_id: 2,
            debug_wireframe,
        }
    }

    /// Validate and register a material under a unique name
    pub fn add(&mut self, mut material: Material) -> Result<MaterialId, AssetError> {
        let name = material.name().to_string();
        if let Err(err) = material.validate() {
            return Err(AssetError::InvalidMaterial { name, reason: err.to_string() });
        }
        material.sort_id = self.next_sort_id;
        let id = self.store.insert(name.clone(), material)?;
        self.next_sort_id += 1;
        log::debug!("Registered material '{}' (sort id {})", name, self.next_sort_id - 1);
        Ok(id)
    }

    /// Look up a material
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.store.get(id)
    }

    /// Look up a material for modification
    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.store.get_mut(id)
    }

    /// Handle of the material registered under `name`
    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.store.find(name)
    }

    /// Drop a material by name; false if there is none
    ///
    /// The debug wireframe material cannot be unloaded.
    pub fn unload(&mut self, name: &str) -> bool {
        if name == DEBUG_WIREFRAME_MATERIAL {
            return false;
        }
        self.store.unload(name)
    }

    /// Material used for debug bounding boxes and axes
    pub fn debug_wireframe(&self) -> MaterialId {
        self.debug_wireframe
    }

    /// Number of registered materials, the built-in one included
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Never true: the built-in material is always present
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::new()
    }
}
