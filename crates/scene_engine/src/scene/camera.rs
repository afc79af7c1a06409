//! # 3D Camera System
//!
//! Cameras supply the view and projection matrices, the world-space basis
//! used for depth sorting, and the frustum used for culling. A scene graph
//! owns its cameras through a [`CameraManager`], which tracks the one
//! "current" camera used by visibility queries.
//!
//! # Coordinate System
//! Right-handed, Y-up. A camera with identity orientation looks down -Z
//! with +X to its right.

use std::collections::BTreeMap;

use crate::foundation::math::{is_near_zero, utils, Mat4, Point3, Quat, Vec3};
use crate::scene::bounds::{Aabb, Frustum};
use crate::scene::{SceneError, SceneResult};

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,

    /// Camera position in world space
    position: Vec3,

    /// Camera orientation in world space
    orientation: Quat,

    /// Field of view angle in radians
    fov: f32,

    /// Aspect ratio (width / height) for projection calculations
    aspect: f32,

    /// Distance to near clipping plane
    near: f32,

    /// Distance to far clipping plane
    far: f32,
}

impl Camera {
    /// Create a new perspective camera looking down -Z
    ///
    /// # Arguments
    /// * `name` - Name used to register the camera with a [`CameraManager`]
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(
        name: impl Into<String>,
        position: Vec3,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            orientation: Quat::identity(),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Camera name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Camera position in world space
    pub fn world_position(&self) -> Vec3 {
        self.position
    }

    /// Camera orientation in world space
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera '{}' position updated to: {:?}", self.name, position);
    }

    /// Replace the camera orientation
    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
    }

    /// Turn the camera to face `target`, keeping `up` as close to vertical as possible
    ///
    /// Does nothing when the target coincides with the camera position.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let direction = target - self.position;
        if is_near_zero(&direction) {
            log::warn!("Camera '{}' asked to look at its own position", self.name);
            return;
        }
        // face_towards aligns +Z with the argument; the camera looks down -Z.
        self.orientation = Quat::face_towards(&(-direction), &up);
        log::trace!("Camera '{}' look_at updated - target: {:?}", self.name, target);
    }

    /// Update camera aspect ratio for viewport changes
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera '{}' aspect ratio changed: {:.3} -> {:.3}", self.name, self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Unit vector the camera looks along
    pub fn direction(&self) -> Vec3 {
        self.orientation * -Vec3::z()
    }

    /// Unit vector pointing to the camera's right
    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::x()
    }

    /// Unit vector pointing up from the camera
    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::y()
    }

    /// Generate view matrix for world-to-camera space transformation
    pub fn view_matrix(&self) -> Mat4 {
        let eye = Point3::from(self.position);
        let target = Point3::from(self.position + self.direction());
        Mat4::look_at_rh(&eye, &target, &self.up())
    }

    /// Generate perspective projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// Generate combined view-projection matrix (projection * view)
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Frustum of this camera in world space
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection_matrix())
    }

    /// Test a world-space bounding box against the view frustum
    pub fn frustum_intersects(&self, bounds: &Aabb) -> bool {
        self.frustum().intersects_aabb(bounds)
    }
}

/// Registry of the cameras belonging to one scene graph
///
/// Cameras are keyed by name. At most one camera is current at a time; the
/// first camera added becomes current automatically.
#[derive(Debug, Default)]
pub struct CameraManager {
    cameras: BTreeMap<String, Camera>,
    current: Option<String>,
}

impl CameraManager {
    /// Create an empty camera manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a camera, failing if the name is already taken
    pub fn add(&mut self, camera: Camera) -> SceneResult<()> {
        if self.cameras.contains_key(camera.name()) {
            return Err(SceneError::DuplicateCamera(camera.name().to_string()));
        }
        let name = camera.name().to_string();
        if self.current.is_none() {
            self.current = Some(name.clone());
        }
        log::debug!("Registered camera '{}'", name);
        self.cameras.insert(name, camera);
        Ok(())
    }

    /// Remove a camera by name; clears the current selection if it was current
    pub fn remove(&mut self, name: &str) -> Option<Camera> {
        let removed = self.cameras.remove(name)?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Some(removed)
    }

    /// Look up a camera by name
    pub fn get(&self, name: &str) -> Option<&Camera> {
        self.cameras.get(name)
    }

    /// Look up a camera by name for modification
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Camera> {
        self.cameras.get_mut(name)
    }

    /// Select the current camera
    pub fn set_current(&mut self, name: &str) -> SceneResult<()> {
        if !self.cameras.contains_key(name) {
            return Err(SceneError::CameraNotFound(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// The current camera, if any
    pub fn current(&self) -> Option<&Camera> {
        self.current.as_deref().and_then(|name| self.cameras.get(name))
    }

    /// The current camera for modification, if any
    pub fn current_mut(&mut self) -> Option<&mut Camera> {
        let name = self.current.as_deref()?;
        self.cameras.get_mut(name)
    }

    /// Number of registered cameras
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Whether no camera is registered
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}
