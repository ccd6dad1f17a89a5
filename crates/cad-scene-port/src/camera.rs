// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera state types for scene rendering.

use core::f32::consts::FRAC_PI_4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Camera projection type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ProjectionKind {
    /// Perspective projection (objects farther away appear smaller).
    Perspective,
    /// Orthographic projection (no perspective distortion).
    Orthographic,
}

/// Camera state for rendering.
///
/// The renderer receives these fields verbatim; any smoothing between two
/// states is the renderer's business.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraState {
    /// Camera position in world space.
    pub position: [f32; 3],
    /// Look-at target in world space.
    pub target: [f32; 3],
    /// Up vector.
    pub up: [f32; 3],
    /// Orientation (x, y, z, w) for trackball-style controls.
    pub quaternion: Option<[f32; 4]>,
    /// Projection type.
    pub projection: ProjectionKind,
    /// Field of view in radians (for perspective).
    pub fov_y_radians: f32,
    /// Orthographic scale (for orthographic).
    pub ortho_scale: f32,
    /// Zoom factor applied on top of the projection.
    pub zoom: f32,
    /// Near clipping plane.
    ///
    /// Values < 0.1 may cause depth buffer precision issues.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: [1.0, 1.0, 1.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            quaternion: None,
            projection: ProjectionKind::Orthographic,
            fov_y_radians: FRAC_PI_4, // 45 degrees
            ortho_scale: 10.0,
            zoom: 1.0,
            near: 0.1,
            far: 10000.0,
        }
    }
}

impl CameraState {
    /// True when every float field is finite and the scalar fields are usable.
    pub fn is_valid(&self) -> bool {
        let vecs_finite = self
            .position
            .iter()
            .chain(self.target.iter())
            .chain(self.up.iter())
            .all(|v| v.is_finite());
        let quat_finite = self
            .quaternion
            .map_or(true, |q| q.iter().all(|v| v.is_finite()));
        vecs_finite
            && quat_finite
            && self.fov_y_radians.is_finite()
            && self.fov_y_radians > 0.0
            && self.fov_y_radians < core::f32::consts::PI
            && self.ortho_scale.is_finite()
            && self.ortho_scale > 0.0
            && self.zoom.is_finite()
            && self.zoom > 0.0
            && self.near > 0.0
            && self.far > self.near
    }
}
