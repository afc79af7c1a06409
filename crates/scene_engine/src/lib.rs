//! # Scene Engine
//!
//! A scene graph and render queue engine with pluggable rendering techniques.
//!
//! ## Features
//!
//! - **Scene Graph**: hierarchical nodes with lazy, dirty-flag driven world transforms
//! - **Entities**: meshes decomposed into per-submesh renderable parts
//! - **Render Queue**: grouped, sorted and instance-batched renderables
//! - **Rendering Techniques**: minimal state switching over a device boundary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     config.init_logging();
//!
//!     let mut resources = Resources::new();
//!     let stone = resources.materials.add(Material::new("stone", ShaderKind::Lit))?;
//!     let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
//!     let cube = Mesh::new(vec![SubMesh::new("cube", GeometryBinding::new(0, 24, 36), bounds, Some(stone))]);
//!     let cube = resources.meshes.add("cube", cube)?;
//!
//!     let mut scene = SceneGraph::with_config("demo", config.scene.clone());
//!     scene.cameras_mut().add(Camera::perspective("main", Vec3::new(0.0, 0.0, 10.0), 60.0, 16.0 / 9.0, 0.1, 100.0))?;
//!     let root = scene.root();
//!     let node = scene.create_child_scene_node(root, "cube")?;
//!     let entity = scene.add_movable(Entity::new("cube", cube, &resources)?);
//!     scene.attach_object(node, entity)?;
//!
//!     let mut queue = RenderQueue::from_config(&config.render);
//!     let mut technique = ForwardRenderingTechnique::new(config.render.clone());
//!     let mut device = RecordingDevice::new();
//!     let stats = scene.render_frame(&mut queue, &mut technique, &resources, &mut device)?;
//!     println!("{} draw calls", stats.draw_calls);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;

pub mod foundation;
pub mod config;
pub mod assets;
pub mod scene;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{GeometryBinding, Mesh, MeshLibrary, MaterialLibrary, Resources, SubMesh},
        core::config::{Config, EngineConfig, RenderConfig, SceneConfig, Viewport},
        foundation::math::{Mat4, Quat, Transform, Vec3},
        render::{
            ForwardRenderingTechnique, FrameStats, GraphicsDevice, Material, RecordingDevice, RenderError,
            RenderQueue, RenderingTechnique, ShaderKind,
        },
        scene::{
            Aabb, AxesGizmo, Camera, Entity, Movable, NodeId, SceneError, SceneGraph, TransformSpace,
        },
    };
}
