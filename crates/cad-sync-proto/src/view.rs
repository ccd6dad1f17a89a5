// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! View state carried in full-state messages: camera, clipping, helpers,
//! controls and animation.

use cad_scene_port::{default_clip_planes, CameraState, ClipPlane, RenderOptions, ShapeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Active pointer-drag mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Left-drag rotates around the target.
    #[default]
    Orbit,
    /// Left-drag translates camera and target.
    Pan,
    /// Pointer drags do nothing.
    None,
}

/// Camera control style.
///
/// Trackball controls carry a free orientation quaternion; orbit controls
/// keep `up` fixed and ignore quaternions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CameraControl {
    /// Free rotation.
    #[default]
    Trackball,
    /// Rotation constrained around `up`.
    Orbit,
}

/// Pointer sensitivity for camera controls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ControlSpeeds {
    /// Wheel zoom speed.
    pub zoom: f32,
    /// Pan speed.
    pub pan: f32,
    /// Rotation speed.
    pub rotate: f32,
}

impl Default for ControlSpeeds {
    fn default() -> Self {
        Self {
            zoom: 0.5,
            pan: 0.5,
            rotate: 1.0,
        }
    }
}

impl ControlSpeeds {
    /// True when every speed is finite and positive.
    pub fn is_valid(&self) -> bool {
        [self.zoom, self.pan, self.rotate]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Error building an [`AnimationTrack`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    /// `times` and `values` differ in length.
    #[error("track has {times} times but {values} values")]
    LengthMismatch {
        /// Number of key times.
        times: usize,
        /// Number of key values.
        values: usize,
    },
    /// A key time or value is NaN or infinite.
    #[error("track contains a non-finite key")]
    NonFinite,
}

/// Keyframe track animating one property of one shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationTrack {
    /// Animated shape.
    pub path: ShapeId,
    /// Animated property (`t`, `tx`, `rz`, `q`, ...).
    pub action: String,
    /// Key times in seconds.
    pub times: Vec<f32>,
    /// Key values; scalars are one-element vectors.
    pub values: Vec<Vec<f32>>,
}

impl AnimationTrack {
    /// Build a track, checking that every time has a value.
    pub fn new(
        path: impl Into<ShapeId>,
        action: impl Into<String>,
        times: Vec<f32>,
        values: Vec<Vec<f32>>,
    ) -> Result<Self, TrackError> {
        let track = Self {
            path: path.into(),
            action: action.into(),
            times,
            values,
        };
        track.validate()?;
        Ok(track)
    }

    /// Re-check a track that arrived through deserialization.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.times.len() != self.values.len() {
            return Err(TrackError::LengthMismatch {
                times: self.times.len(),
                values: self.values.len(),
            });
        }
        let finite = self.times.iter().all(|t| t.is_finite())
            && self.values.iter().flatten().all(|v| v.is_finite());
        if !finite {
            return Err(TrackError::NonFinite);
        }
        Ok(())
    }
}

/// Scrub position inside the animation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationPosition {
    /// Track the position refers to (a track path).
    pub track: String,
    /// Relative time in `[0, 1]`.
    pub time: f32,
}

/// Local playback state. Never synchronized.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Playback {
    /// Not running, rewound.
    #[default]
    Stopped,
    /// Running at the given speed factor.
    Playing(f32),
    /// Halted at the current position.
    Paused,
}

/// Animation part of the view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationState {
    /// Current scrub position, if any.
    #[serde(default)]
    pub position: Option<AnimationPosition>,
    /// Loaded tracks.
    #[serde(default)]
    pub tracks: Vec<AnimationTrack>,
    /// Whether playback wraps around.
    pub looping: bool,
    /// Local playback state.
    #[serde(skip)]
    pub playback: Playback,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            position: None,
            tracks: Vec::new(),
            looping: true,
            playback: Playback::Stopped,
        }
    }
}

impl AnimationState {
    /// True when `track` names a loaded track, or no tracks are loaded.
    pub fn knows_track(&self, track: &str) -> bool {
        self.tracks.is_empty() || self.tracks.iter().any(|t| t.path.as_str() == track)
    }
}

/// Complete view state of one viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewState {
    /// Camera.
    pub camera: CameraState,
    /// Clipping planes, replaced as a whole.
    pub clip_planes: Vec<ClipPlane>,
    /// Clip the intersection of the planes instead of the union.
    pub clip_intersection: bool,
    /// Lights, edges and helpers.
    pub options: RenderOptions,
    /// Pointer-drag mode.
    pub control: ControlMode,
    /// Camera control style.
    pub camera_control: CameraControl,
    /// Pointer sensitivity.
    pub speeds: ControlSpeeds,
    /// Animation tracks and position.
    #[serde(default)]
    pub animation: AnimationState,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            camera: CameraState::default(),
            clip_planes: default_clip_planes(),
            clip_intersection: false,
            options: RenderOptions::default(),
            control: ControlMode::default(),
            camera_control: CameraControl::default(),
            speeds: ControlSpeeds::default(),
            animation: AnimationState::default(),
        }
    }
}
