//! Mesh descriptions
//!
//! A mesh is a list of submeshes, each bound to device geometry through an
//! opaque [`GeometryBinding`] and declaring the materials it is drawn with.

use crate::assets::{AssetError, AssetStore};
use crate::foundation::collections::{MaterialId, MeshId};
use crate::foundation::math::Mat4;
use crate::scene::bounds::{merge_optional, Aabb};

/// Device geometry a draw call refers to
///
/// The engine never looks inside; it only forwards the binding to the
/// graphics device and uses `id` to group instanceable draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryBinding {
    /// Identity of the vertex/index buffers
    pub id: u32,
    /// Number of vertices
    pub vertex_count: u32,
    /// Number of indices drawn
    pub index_count: u32,
}

impl GeometryBinding {
    /// Unit cube edges (`[-1, 1]` on every axis) drawn as lines
    pub const DEBUG_BOX: GeometryBinding = GeometryBinding { id: u32::MAX, vertex_count: 8, index_count: 24 };

    /// Three unit axis lines from the origin
    pub const AXES: GeometryBinding = GeometryBinding { id: u32::MAX - 1, vertex_count: 6, index_count: 6 };

    /// Create a binding
    pub fn new(id: u32, vertex_count: u32, index_count: u32) -> Self {
        Self { id, vertex_count, index_count }
    }
}

/// One drawable part of a mesh
#[derive(Debug, Clone)]
pub struct SubMesh {
    /// Submesh name
    pub name: String,
    /// Geometry drawn for this part
    pub geometry: GeometryBinding,
    /// Bounds in mesh space
    pub bounds: Aabb,
    /// Material per slot; `None` leaves the slot unassigned
    pub material_slots: Vec<Option<MaterialId>>,
    /// Bone driving this part, if skinned
    pub bone_index: Option<usize>,
}

impl SubMesh {
    /// Submesh drawn with a single material
    pub fn new(name: impl Into<String>, geometry: GeometryBinding, bounds: Aabb, material: Option<MaterialId>) -> Self {
        Self {
            name: name.into(),
            geometry,
            bounds,
            material_slots: vec![material],
            bone_index: None,
        }
    }

    /// Attach the submesh to a bone
    pub fn with_bone(mut self, bone_index: usize) -> Self {
        self.bone_index = Some(bone_index);
        self
    }

    /// Replace the material slots
    pub fn with_material_slots(mut self, slots: Vec<Option<MaterialId>>) -> Self {
        self.material_slots = slots;
        self
    }
}

/// Renderable geometry asset
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Parts in draw order
    pub submeshes: Vec<SubMesh>,
    /// Bone matrices in mesh space
    pub bones: Vec<Mat4>,
}

impl Mesh {
    /// Mesh made of the given parts
    pub fn new(submeshes: Vec<SubMesh>) -> Self {
        Self { submeshes, bones: Vec::new() }
    }

    /// Set the bone matrices
    pub fn with_bones(mut self, bones: Vec<Mat4>) -> Self {
        self.bones = bones;
        self
    }

    /// Union of the submesh bounds, `None` for an empty mesh
    pub fn bounds(&self) -> Option<Aabb> {
        self.submeshes
            .iter()
            .fold(None, |acc, submesh| merge_optional(acc, submesh.bounds))
    }
}

/// Registered meshes
#[derive(Debug, Default)]
pub struct MeshLibrary {
    store: AssetStore<MeshId, Mesh>,
}

impl MeshLibrary {
    /// Empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh under a unique name
    pub fn add(&mut self, name: impl Into<String>, mesh: Mesh) -> Result<MeshId, AssetError> {
        let name = name.into();
        let submeshes = mesh.submeshes.len();
        let id = self.store.insert(name.clone(), mesh)?;
        log::debug!("Registered mesh '{}' with {} submesh(es)", name, submeshes);
        Ok(id)
    }

    /// Look up a mesh
    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.store.get(id)
    }

    /// Look up a mesh for modification
    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.store.get_mut(id)
    }

    /// Handle of the mesh registered under `name`
    pub fn find(&self, name: &str) -> Option<MeshId> {
        self.store.find(name)
    }

    /// Drop a mesh by name; false if there is none
    pub fn unload(&mut self, name: &str) -> bool {
        self.store.unload(name)
    }

    /// Number of registered meshes
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no mesh is registered
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_mesh_bounds_cover_all_submeshes() {
        let mesh = Mesh::new(vec![
            SubMesh::new("a", GeometryBinding::new(1, 3, 3), Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)), None),
            SubMesh::new("b", GeometryBinding::new(2, 3, 3), Aabb::new(Vec3::new(-2.0, 0.0, 0.0), Vec3::zeros()), None),
        ]);
        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0));
        assert!(Mesh::default().bounds().is_none());
    }

    #[test]
    fn test_library_lookup_and_unload() {
        let mut library = MeshLibrary::new();
        let id = library.add("cube", Mesh::default()).unwrap();
        assert_eq!(library.find("cube"), Some(id));
        assert!(library.add("cube", Mesh::default()).is_err());
        assert!(library.unload("cube"));
        assert!(library.get(id).is_none());
        assert!(!library.unload("cube"));
    }
}
