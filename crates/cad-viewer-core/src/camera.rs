// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera math for pointer controls.
//!
//! Drag deltas are in viewport fractions (a full-width drag is 1.0). Every
//! helper returns a new [`CameraState`]; the caller turns the difference into
//! view deltas.

use cad_scene_port::{CameraState, ProjectionKind};
use cad_sync_proto::CameraControl;
use glam::{Quat, Vec2, Vec3};
use std::f32::consts::PI;

/// Closest the orbit offset may get to the up axis, in radians.
pub const MIN_POLAR: f32 = 0.01;

const MIN_ZOOM: f32 = 0.01;
const MAX_ZOOM: f32 = 100.0;

struct Basis {
    offset: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
}

fn basis(cam: &CameraState) -> Basis {
    let offset = Vec3::from(cam.position) - Vec3::from(cam.target);
    let forward = (-offset).normalize_or_zero();
    let up = Vec3::from(cam.up).try_normalize().unwrap_or(Vec3::Z);
    let right = forward.cross(up).normalize_or_zero();
    let up = if right == Vec3::ZERO {
        up
    } else {
        right.cross(forward).normalize_or_zero()
    };
    Basis {
        offset,
        forward,
        right,
        up,
    }
}

/// Rotate the camera around its target.
///
/// Orbit control keeps `up` fixed and clamps the polar angle; trackball
/// control rotates `up` with the camera and tracks the orientation in
/// `quaternion`.
pub fn orbit(cam: &CameraState, delta: Vec2, speed: f32, control: CameraControl) -> CameraState {
    let b = basis(cam);
    if b.offset == Vec3::ZERO {
        return *cam;
    }
    let yaw = -delta.x * PI * speed;
    let pitch = -delta.y * PI * speed;
    let target = Vec3::from(cam.target);
    let mut next = *cam;
    match control {
        CameraControl::Orbit => {
            let world_up = Vec3::from(cam.up).try_normalize().unwrap_or(Vec3::Z);
            let mut offset = Quat::from_axis_angle(world_up, yaw) * b.offset;
            let right = (-offset).cross(world_up).normalize_or_zero();
            if right != Vec3::ZERO {
                let polar = offset.angle_between(world_up);
                let applied = (polar + pitch).clamp(MIN_POLAR, PI - MIN_POLAR) - polar;
                if applied.abs() > 1e-6 {
                    offset = Quat::from_axis_angle(right, applied) * offset;
                }
            }
            next.position = (target + offset).to_array();
            next.quaternion = None;
        }
        CameraControl::Trackball => {
            let q = (Quat::from_axis_angle(b.up, yaw) * Quat::from_axis_angle(b.right, pitch))
                .normalize();
            next.position = (target + q * b.offset).to_array();
            next.up = (q * b.up).normalize_or_zero().to_array();
            let prior = cam
                .quaternion
                .map_or(Quat::IDENTITY, |[x, y, z, w]| Quat::from_xyzw(x, y, z, w));
            next.quaternion = Some((q * prior).normalize().to_array());
        }
    }
    next
}

/// Translate camera and target in the view plane.
pub fn pan(cam: &CameraState, delta: Vec2, speed: f32) -> CameraState {
    let b = basis(cam);
    let extent = match cam.projection {
        ProjectionKind::Perspective => 2.0 * (cam.fov_y_radians * 0.5).tan() * b.offset.length(),
        ProjectionKind::Orthographic => cam.ortho_scale,
    } / cam.zoom.max(MIN_ZOOM);
    let shift = (b.right * -delta.x + b.up * delta.y) * extent * speed;
    let mut next = *cam;
    next.position = (Vec3::from(cam.position) + shift).to_array();
    next.target = (Vec3::from(cam.target) + shift).to_array();
    next
}

/// Scale the zoom factor. Positive `steps` zoom in.
pub fn zoom(cam: &CameraState, steps: f32, speed: f32) -> CameraState {
    let mut next = *cam;
    next.zoom = (cam.zoom * 2f32.powf(steps * speed)).clamp(MIN_ZOOM, MAX_ZOOM);
    next
}

/// Move the target to `point`, keeping the viewing direction and distance.
pub fn recenter(cam: &CameraState, point: [f32; 3]) -> CameraState {
    let shift = Vec3::from(point) - Vec3::from(cam.target);
    let mut next = *cam;
    next.position = (Vec3::from(cam.position) + shift).to_array();
    next.target = point;
    next
}

/// Flip between perspective and orthographic projection.
pub fn toggle_projection(cam: &CameraState) -> CameraState {
    let mut next = *cam;
    next.projection = match cam.projection {
        ProjectionKind::Perspective => ProjectionKind::Orthographic,
        ProjectionKind::Orthographic => ProjectionKind::Perspective,
    };
    next
}

/// Direction the camera looks along.
pub fn view_direction(cam: &CameraState) -> [f32; 3] {
    basis(cam).forward.to_array()
}
