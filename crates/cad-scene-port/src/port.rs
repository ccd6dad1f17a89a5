// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render port trait defining the rendering-capability contract.

use thiserror::Error;

use crate::{
    CameraState, ClipPlane, HighlightState, Material, MeshBuffers, PickHit, RenderOptions,
    ShapeId,
};

/// Error raised by a rendering capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The drawing context was lost (GPU reset, canvas detached).
    #[error("render context lost: {0}")]
    ContextLost(String),
    /// The shape has no uploaded geometry.
    #[error("no geometry uploaded for shape {0}")]
    MissingHandle(ShapeId),
    /// A backend-specific error occurred.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Rendering-capability port.
///
/// Implementors own GPU handles keyed by [`ShapeId`]. They never decide
/// what to draw; the renderer binding in the sync core decides which calls
/// are needed and guarantees that unchanged state is not re-sent.
///
/// # Design
///
/// This trait is a hexagonal port. The sync core drives it; adapters (a
/// three.js bridge, a wgpu backend, the headless mock) implement it.
pub trait RenderPort {
    /// Upload (or replace) the geometry for a shape.
    fn upload_mesh(&mut self, shape: &ShapeId, mesh: &MeshBuffers) -> Result<(), RenderError>;

    /// Release the geometry handle for a shape.
    fn remove_mesh(&mut self, shape: &ShapeId) -> Result<(), RenderError>;

    /// Toggle face and edge visibility without touching geometry.
    fn set_visibility(
        &mut self,
        shape: &ShapeId,
        faces: bool,
        edges: bool,
    ) -> Result<(), RenderError>;

    /// Update material hints without touching geometry.
    fn set_material(&mut self, shape: &ShapeId, material: &Material) -> Result<(), RenderError>;

    /// Set camera state.
    fn set_camera(&mut self, camera: &CameraState) -> Result<(), RenderError>;

    /// Replace the clipping plane list.
    fn set_clip_planes(&mut self, planes: &[ClipPlane], intersection: bool)
        -> Result<(), RenderError>;

    /// Set scene-wide render options.
    fn set_render_options(&mut self, options: &RenderOptions) -> Result<(), RenderError>;

    /// Set highlight state (selection/hover).
    fn set_highlight(&mut self, highlight: &HighlightState) -> Result<(), RenderError>;

    /// Cast a pick ray at normalized screen coordinates (`[0, 1]`, origin top-left).
    fn pick(&mut self, x: f32, y: f32) -> Result<Option<PickHit>, RenderError>;

    /// Drop every geometry handle (used before a full re-upload).
    fn clear(&mut self) -> Result<(), RenderError>;

    /// Resize viewport.
    fn resize(&mut self, width: u32, height: u32, dpr: f32);

    /// Render the current scene.
    fn render(&mut self);

    /// Capture the current frame as an encoded image.
    fn export_image(&mut self) -> Result<Vec<u8>, RenderError>;

    /// Dispose all resources.
    fn dispose(&mut self);
}
